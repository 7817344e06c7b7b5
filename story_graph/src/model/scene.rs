//! Scene definitions - the nodes and edges of the narrative graph.

use serde::{Deserialize, Serialize};

use super::SceneId;

/// A single choice edge leading from one scene to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Stable identifier, unique within the owning scene.
    pub id: String,
    /// Display label shown to the player.
    pub text: String,
    /// Target scene. Resolution is checked at load time, not at traversal time.
    pub next_scene_id: SceneId,
}

/// A node in the narrative graph.
///
/// Option order is meaningful: it defines the numbered choice indices shown
/// to the player. The loader guarantees non-end scenes have at least one
/// option and end scenes have none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    /// Fully resolved narrative text (inline or resolved from the story scripts).
    pub narrative: String,
    pub is_end: bool,
    pub options: Vec<ChoiceOption>,
}

impl Scene {
    /// Look up an option by its displayed 1-based number.
    pub fn option(&self, number: usize) -> Option<&ChoiceOption> {
        number.checked_sub(1).and_then(|index| self.options.get(index))
    }

    /// Split the narrative into delivery chunks of at most `chunk_size`
    /// characters, breaking on whitespace where possible.
    ///
    /// Chunking is a presentation concern; the full text stays available in
    /// `narrative`.
    pub fn chunks(&self, chunk_size: usize) -> Vec<&str> {
        chunk_text(&self.narrative, chunk_size)
    }
}

fn chunk_text(text: &str, chunk_size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();
    if rest.is_empty() {
        return chunks;
    }
    if chunk_size == 0 {
        chunks.push(rest);
        return chunks;
    }

    while !rest.is_empty() {
        let limit = match rest.char_indices().nth(chunk_size) {
            Some((byte_index, _)) => byte_index,
            None => {
                chunks.push(rest);
                break;
            }
        };
        // Prefer the last whitespace inside the window; hard-cut if there is none.
        let cut = match rest[..limit].rfind(char::is_whitespace) {
            Some(0) | None => limit,
            Some(at) => at,
        };
        chunks.push(rest[..cut].trim_end());
        rest = rest[cut..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_with_options(option_count: usize) -> Scene {
        Scene {
            id: SceneId::new("workshop"),
            narrative: "The workbench hums.".to_string(),
            is_end: false,
            options: (0..option_count)
                .map(|i| ChoiceOption {
                    id: format!("opt_{i}"),
                    text: format!("Option {i}"),
                    next_scene_id: SceneId::new("workshop"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_option_lookup_is_one_based() {
        let scene = scene_with_options(2);
        assert_eq!(scene.option(1).map(|o| o.id.as_str()), Some("opt_0"));
        assert_eq!(scene.option(2).map(|o| o.id.as_str()), Some("opt_1"));
        assert!(scene.option(0).is_none());
        assert!(scene.option(3).is_none());
    }

    #[test]
    fn test_chunks_break_on_whitespace() {
        let scene = Scene {
            narrative: "one two three four five".to_string(),
            ..scene_with_options(1)
        };
        let chunks = scene.chunks(9);
        assert_eq!(chunks, vec!["one two", "three", "four five"]);
    }

    #[test]
    fn test_chunks_hard_cut_without_whitespace() {
        let scene = Scene {
            narrative: "abcdefghij".to_string(),
            ..scene_with_options(1)
        };
        assert_eq!(scene.chunks(4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunk_size_zero_returns_full_text() {
        let scene = scene_with_options(1);
        assert_eq!(scene.chunks(0), vec!["The workbench hums."]);
    }

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let scene = scene_with_options(1);
        assert_eq!(scene.chunks(500), vec!["The workbench hums."]);
    }
}
