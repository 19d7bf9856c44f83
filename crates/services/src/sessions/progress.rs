/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub answered: usize,
    /// `None` while the total is still being discovered.
    pub expected: Option<u32>,
    pub loaded: usize,
    pub is_complete: bool,
}
