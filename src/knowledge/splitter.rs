/// Greedy character splitter: pieces separated by `separator` are merged into chunks of at
/// most `chunk_size` characters, and each new chunk starts with trailing pieces of the
/// previous one totalling at most `chunk_overlap` characters.
pub struct TextSplitter {
    separator: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            separator: "\n\n".to_string(),
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let sep_len = self.separator.chars().count();
        let pieces: Vec<&str> = text
            .split(self.separator.as_str())
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .collect();

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0;

        for piece in pieces {
            let len = piece.chars().count();
            let joined_len = if current.is_empty() { len } else { total + sep_len + len };

            if joined_len > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(&self.separator));

                // Keep a tail of the finished chunk as overlap.
                while !current.is_empty()
                    && (total > self.chunk_overlap || total + sep_len + len > self.chunk_size)
                {
                    let removed = current.remove(0).chars().count();
                    total -= removed;
                    if !current.is_empty() {
                        total -= sep_len;
                    }
                }
            }

            total = if current.is_empty() { len } else { total + sep_len + len };
            current.push(piece);
        }

        if !current.is_empty() {
            chunks.push(current.join(&self.separator));
        }
        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}
