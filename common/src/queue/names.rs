/// Global queue for feed synchronisation.
pub const SYNC: &str = "sync-feeds";

/// Per-article processing stages, each with one queue per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Scrape,
    Translate,
    Summarize,
    Embed,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Scrape, Stage::Translate, Stage::Summarize, Stage::Embed];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Translate => "translate",
            Stage::Summarize => "summarize",
            Stage::Embed => "embed",
        }
    }

    /// Queue name for this stage in `region`, e.g. `translate-jp`.
    pub fn queue(self, region: &str) -> String {
        format!("{}-{region}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| crate::error::AppError::Validation(format!("Unknown stage '{s}'")))
    }
}
