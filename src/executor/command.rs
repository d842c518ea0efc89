//! Interactive command parsing

use crate::error::CommandError;

/// Words beyond this many in a `/search` are ignored
pub const MAX_SEARCH_WORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(Vec<String>),
    MaxCount(String),
    MinCount(String),
    WordCount,
    Exit,
}

impl Command {
    /// Parse one command line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(None);
        };

        let command = match verb {
            "/search" => {
                let words: Vec<String> = parts.take(MAX_SEARCH_WORDS).map(str::to_string).collect();
                if words.is_empty() {
                    return Err(CommandError::Usage("/search word1 [word2 ... word10]"));
                }
                Command::Search(words)
            }
            "/maxcount" => Command::MaxCount(
                parts
                    .next()
                    .ok_or(CommandError::Usage("/maxcount word"))?
                    .to_string(),
            ),
            "/mincount" => Command::MinCount(
                parts
                    .next()
                    .ok_or(CommandError::Usage("/mincount word"))?
                    .to_string(),
            ),
            "/wc" => Command::WordCount,
            "/exit" => Command::Exit,
            _ => return Err(CommandError::Unrecognized),
        };
        Ok(Some(command))
    }
}
