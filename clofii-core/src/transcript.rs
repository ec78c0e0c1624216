/// What the agent has said so far, one entry per completed turn.
///
/// Held in memory only and cleared when the session ends.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<String>,
    current: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, text: &str) {
        self.current.push_str(text);
    }

    /// Close the turn in progress. Returns its text, or `None` if the agent
    /// produced no text this turn (audio-only responses).
    pub fn complete_turn(&mut self) -> Option<String> {
        if self.current.trim().is_empty() {
            self.current.clear();
            return None;
        }
        let turn = std::mem::take(&mut self.current);
        self.turns.push(turn.clone());
        Some(turn)
    }

    pub fn turns(&self) -> &[String] {
        &self.turns
    }

    /// Text of the turn still in progress.
    pub fn pending(&self) -> &str {
        &self.current
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.current.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_join_into_turns() {
        let mut transcript = Transcript::new();
        transcript.push_delta("Hello, ");
        transcript.push_delta("welcome.");
        assert_eq!(transcript.pending(), "Hello, welcome.");
        assert_eq!(transcript.complete_turn().as_deref(), Some("Hello, welcome."));

        transcript.push_delta("Tell me about yourself.");
        transcript.complete_turn();
        assert_eq!(transcript.turns().len(), 2);
        assert_eq!(transcript.pending(), "");
    }

    #[test]
    fn test_audio_only_turn_is_skipped() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.complete_turn(), None);
        transcript.push_delta("  ");
        assert_eq!(transcript.complete_turn(), None);
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut transcript = Transcript::new();
        transcript.push_delta("a");
        transcript.complete_turn();
        transcript.push_delta("b");
        transcript.clear();
        assert!(transcript.is_empty());
    }
}
