//! Output truncation for captured process output kept in audit records.

/// How to truncate output that exceeds the maximum byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep first 40% and last 60%, with a marker in the middle.
    HeadTail,
    /// Keep the last `max_chars`, with a marker at the start.
    Tail,
}

/// Largest char boundary in `s` that is `<= index`.
fn floor_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary in `s` that is `>= index`.
fn ceil_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Truncate `output` to roughly `max_chars` bytes using the given mode.
///
/// Output within the limit is returned unchanged. Cuts always land on UTF-8
/// boundaries, and a marker records how much was removed.
pub fn truncate_output(output: &str, max_chars: usize, mode: TruncationMode) -> String {
    if output.len() <= max_chars {
        return output.to_string();
    }

    match mode {
        TruncationMode::HeadTail => {
            let head_end = floor_boundary(output, max_chars * 40 / 100);
            let tail_start = ceil_boundary(output, output.len() - (max_chars - max_chars * 40 / 100));
            let removed = tail_start - head_end;
            format!(
                "{}\n[WARNING: Output truncated. {} characters removed from middle]\n{}",
                &output[..head_end],
                removed,
                &output[tail_start..]
            )
        }
        TruncationMode::Tail => {
            let tail_start = ceil_boundary(output, output.len() - max_chars);
            format!(
                "\n[WARNING: Output truncated. {} characters removed from start]\n{}",
                tail_start,
                &output[tail_start..]
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_within_limit() {
        let input = "short";
        let result = truncate_output(input, 100, TruncationMode::HeadTail);
        assert_eq!(result, input);
    }

    #[test]
    fn head_tail_truncation() {
        let input: String = (0..100).map(|i| char::from(b'a' + (i % 26))).collect();
        let result = truncate_output(&input, 50, TruncationMode::HeadTail);

        assert!(result.contains("50 characters removed from middle"));
        // Head is 40% of 50 = 20 chars, tail is 30 chars
        assert!(result.starts_with(&input[..20]));
        assert!(result.ends_with(&input[70..]));
    }

    #[test]
    fn tail_truncation() {
        let input: String = (0..100).map(|i| char::from(b'a' + (i % 26))).collect();
        let result = truncate_output(&input, 50, TruncationMode::Tail);

        assert!(result.contains("characters removed from start"));
        assert!(result.ends_with(&input[50..]));
    }

    #[test]
    fn multibyte_output_does_not_split_chars() {
        let input = "é".repeat(60);
        let result = truncate_output(&input, 51, TruncationMode::HeadTail);
        assert!(result.contains("removed from middle"));
        let result = truncate_output(&input, 51, TruncationMode::Tail);
        assert!(result.ends_with('é'));
    }
}
