//! Line-oriented network file parsing.
//!
//! ```text
//! # comment
//! A : 1 2 ; 3 4
//! B : 3 4 ; 5
//! TOUT : 1 2 ; 5
//! ```
//!
//! Labels before `;` are the IN bonds of the pattern, labels after it the
//! OUT bonds. A line without `;` has zero IN labels. The `TOUT` entry names
//! the output ordering and split.

use crate::error::{NetworkError, Result};

#[derive(Debug, Clone)]
pub(crate) struct NetLine {
    pub name: String,
    pub labels: Vec<i32>,
    pub in_count: usize,
}

pub(crate) fn parse_network(text: &str) -> Result<Vec<NetLine>> {
    let mut lines = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, rest) = line.split_once(':').ok_or_else(|| {
            NetworkError::InvalidNetwork(format!("line {}: missing ':'", lineno + 1))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(NetworkError::InvalidNetwork(format!(
                "line {}: empty tensor name",
                lineno + 1
            )));
        }

        let (in_part, out_part) = match rest.split_once(';') {
            Some((i, o)) => (i, o),
            None => ("", rest),
        };
        let mut labels = parse_labels(in_part, lineno)?;
        let in_count = labels.len();
        labels.extend(parse_labels(out_part, lineno)?);

        lines.push(NetLine {
            name: name.to_string(),
            labels,
            in_count,
        });
    }
    if lines.is_empty() {
        return Err(NetworkError::InvalidNetwork("empty network file".into()));
    }
    Ok(lines)
}

fn parse_labels(part: &str, lineno: usize) -> Result<Vec<i32>> {
    part.split_whitespace()
        .map(|tok| {
            tok.parse::<i32>().map_err(|_| {
                NetworkError::InvalidNetwork(format!(
                    "line {}: '{}' is not an integer label",
                    lineno + 1,
                    tok
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let text = "\
# ring of two
A : 1 ; 2
B : 2 ; 1

TOUT :  ;
";
        let lines = parse_network(text).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].name, "A");
        assert_eq!(lines[0].labels, vec![1, 2]);
        assert_eq!(lines[0].in_count, 1);
        assert_eq!(lines[2].name, "TOUT");
        assert!(lines[2].labels.is_empty());
    }

    #[test]
    fn test_parse_no_semicolon() {
        let lines = parse_network("A : 1 2 3").unwrap();
        assert_eq!(lines[0].in_count, 0);
        assert_eq!(lines[0].labels, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_network("A 1 2").is_err());
        assert!(parse_network("A : x ; 2").is_err());
        assert!(parse_network("# only comments\n").is_err());
    }
}
