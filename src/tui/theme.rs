use crossterm::style::Color;

/// Colors used by the terminal renderer
pub struct Theme {
    /// Streamed answer text
    pub assistant: Color,
    pub system: Color,
    pub error: Color,
    /// Secondary info
    pub dim: Color,
    pub success: Color,
    pub title: Color,
    /// Numbers: tokens, counts, scores
    pub stats: Color,
    /// Language names and other highlighted labels
    pub command: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            assistant: Color::White,
            system: Color::DarkYellow,
            error: Color::Red,
            dim: Color::DarkGrey,
            success: Color::Green,
            title: Color::Magenta,
            stats: Color::Blue,
            command: Color::Yellow,
        }
    }
}
