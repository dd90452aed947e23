/// The single authoritative value describing where the user-facing flow stands
///
/// Transitions are monotonic within one request cycle:
/// Idle → Recording → Transcribing → Succeeded | Failed → Idle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiState {
    Idle,
    Recording,
    Transcribing,
    Succeeded(String),
    Failed(String),
}

impl UiState {
    /// A request cycle has finished and awaits acknowledgement
    pub fn is_terminal(&self) -> bool {
        matches!(self, UiState::Succeeded(_) | UiState::Failed(_))
    }
}
