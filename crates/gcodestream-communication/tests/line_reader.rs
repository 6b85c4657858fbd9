use gcodestream_communication::LineReader;
use proptest::prelude::*;
use std::io::{self, Cursor, Read};

/// Hands out at most `chunk` bytes per read
struct Trickle {
    data: Cursor<Vec<u8>>,
    chunk: usize,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(self.chunk);
        self.data.read(&mut buf[..limit])
    }
}

fn blocks<R: Read>(mut reader: LineReader<R>) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(line) = reader.read_line().unwrap() {
        out.push(line.to_vec());
    }
    out
}

/// Straightforward line-by-line cleanup for comparison
fn expected(text: &str, remove_comments: bool) -> Vec<Vec<u8>> {
    text.split(['\n', '\r'])
        .map(|line| {
            let line = if remove_comments {
                line.split(';').next().unwrap_or("")
            } else {
                line
            };
            line.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b')
        })
        .filter(|line| !line.is_empty())
        .map(|line| format!("{line}\n").into_bytes())
        .collect()
}

#[test]
fn test_batches_follow_requested_count() {
    let mut reader = LineReader::new(Cursor::new("A\nB\nC\nD\nE\n"), 4096, true);
    let mut sizes = Vec::new();
    while !reader.is_eof() {
        let batch = reader.read_next_lines(2).unwrap();
        if !batch.is_empty() {
            sizes.push(batch.len());
        }
    }
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn test_trickled_input_with_tiny_arena() {
    let source = Trickle {
        data: Cursor::new(b"G1 X10 ; c\r\n\r\nG1 Y5\rM2".to_vec()),
        chunk: 3,
    };
    let lines = blocks(LineReader::new(source, 16, true));
    assert_eq!(lines, vec![b"G1 X10\n".to_vec(), b"G1 Y5\n".to_vec(), b"M2\n".to_vec()]);
}

proptest! {
    #[test]
    fn prop_chunking_does_not_change_blocks(
        lines in prop::collection::vec("[ \tA-Z0-9.;]{0,20}", 0..30),
        ending in prop::sample::select(vec!["\n", "\r", "\r\n"]),
        chunk in 1usize..64,
        remove_comments in any::<bool>(),
    ) {
        let text = lines.join(ending);
        let whole = blocks(LineReader::new(Cursor::new(text.clone().into_bytes()), 4096, remove_comments));
        let trickled = blocks(LineReader::new(
            Trickle { data: Cursor::new(text.clone().into_bytes()), chunk },
            64,
            remove_comments,
        ));
        prop_assert_eq!(&whole, &trickled);
        prop_assert_eq!(whole, expected(&text, remove_comments));
    }

    #[test]
    fn prop_blocks_are_clean(text in "[ \tA-Z;\r\n]{0,200}") {
        for block in blocks(LineReader::new(Cursor::new(text.into_bytes()), 256, true)) {
            prop_assert_eq!(block.last(), Some(&b'\n'));
            let body = &block[..block.len() - 1];
            prop_assert!(!body.is_empty());
            prop_assert!(!body.contains(&b';'));
            prop_assert!(!body.contains(&b'\r') && !body.contains(&b'\n'));
            prop_assert!(!body[0].is_ascii_whitespace());
            prop_assert!(!body[body.len() - 1].is_ascii_whitespace());
        }
    }
}
