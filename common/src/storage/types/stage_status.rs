use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle events shared by every per-article stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Start,
    Succeed,
    Fail,
    Reset,
}

impl StageEvent {
    fn as_str(self) -> &'static str {
        match self {
            StageEvent::Start => "start",
            StageEvent::Succeed => "succeed",
            StageEvent::Fail => "fail",
            StageEvent::Reset => "reset",
        }
    }
}

macro_rules! stage_status {
    ($(#[$meta:meta])* $name:ident, $running:ident, $running_label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            #[default]
            Pending,
            $running,
            Complete,
            Error,
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    Self::Pending => "pending",
                    Self::$running => $running_label,
                    Self::Complete => "complete",
                    Self::Error => "error",
                }
            }

            /// Next status after `event`.
            ///
            /// `complete` is only reachable from the running state. `start` re-enters the
            /// running state on retries and redeliveries. `fail` is accepted from any state, so
            /// a precondition failure on a redelivered job is recorded even after completion.
            pub fn apply(self, event: StageEvent) -> Result<Self, AppError> {
                match (self, event) {
                    (_, StageEvent::Reset) => Ok(Self::Pending),
                    (_, StageEvent::Start) => Ok(Self::$running),
                    (_, StageEvent::Fail) => Ok(Self::Error),
                    (Self::$running, StageEvent::Succeed) => Ok(Self::Complete),
                    (state, event) => Err(AppError::Validation(format!(
                        "Invalid {} transition: {} -> {}",
                        stringify!($name),
                        state.as_str(),
                        event.as_str()
                    ))),
                }
            }

            pub fn is_terminal(self) -> bool {
                matches!(self, Self::Complete | Self::Error)
            }
        }
    };
}

stage_status!(
    /// Progress of the translate stage.
    TranslationStatus,
    Translating,
    "translating"
);
stage_status!(
    /// Progress of the summarize stage.
    SummaryStatus,
    Summarizing,
    "summarizing"
);
stage_status!(
    /// Progress of the embed stage.
    EmbeddingStatus,
    Embedding,
    "embedding"
);

/// Which backend produced an article's translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    LibreTranslate,
    Llm,
    /// Source already in the target language; copied through unchanged.
    Passthrough,
}

impl TranslationProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            TranslationProvider::LibreTranslate => "libretranslate",
            TranslationProvider::Llm => "llm",
            TranslationProvider::Passthrough => "passthrough",
        }
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "libretranslate" => Ok(Self::LibreTranslate),
            "llm" => Ok(Self::Llm),
            "passthrough" => Ok(Self::Passthrough),
            other => Err(AppError::Validation(format!(
                "Unknown translation provider '{other}'"
            ))),
        }
    }
}

/// Topic the summarizer files an article under.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryCategory {
    Politics,
    #[default]
    News,
    Tech,
    Government,
    Underreported,
    Law,
    Economics,
}

impl SummaryCategory {
    pub const ALL: [SummaryCategory; 7] = [
        SummaryCategory::Politics,
        SummaryCategory::News,
        SummaryCategory::Tech,
        SummaryCategory::Government,
        SummaryCategory::Underreported,
        SummaryCategory::Law,
        SummaryCategory::Economics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SummaryCategory::Politics => "politics",
            SummaryCategory::News => "news",
            SummaryCategory::Tech => "tech",
            SummaryCategory::Government => "government",
            SummaryCategory::Underreported => "underreported",
            SummaryCategory::Law => "law",
            SummaryCategory::Economics => "economics",
        }
    }

    /// Lenient parse for model output: anything outside the vocabulary files as `News`.
    pub fn coerce(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl std::str::FromStr for SummaryCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| AppError::Validation(format!("Unknown summary category '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_requires_running_state() {
        assert!(TranslationStatus::Pending
            .apply(StageEvent::Succeed)
            .is_err());
        assert!(SummaryStatus::Error.apply(StageEvent::Succeed).is_err());

        let running = SummaryStatus::Pending
            .apply(StageEvent::Start)
            .expect("start");
        assert_eq!(running, SummaryStatus::Summarizing);
        assert_eq!(
            running.apply(StageEvent::Succeed).expect("succeed"),
            SummaryStatus::Complete
        );
    }

    #[test]
    fn precondition_failure_goes_straight_to_error() {
        assert_eq!(
            SummaryStatus::Pending.apply(StageEvent::Fail).expect("fail"),
            SummaryStatus::Error
        );
        assert_eq!(
            EmbeddingStatus::Complete.apply(StageEvent::Fail).expect("fail"),
            EmbeddingStatus::Error
        );
    }

    #[test]
    fn reset_always_returns_to_pending() {
        for status in [
            TranslationStatus::Pending,
            TranslationStatus::Translating,
            TranslationStatus::Complete,
            TranslationStatus::Error,
        ] {
            assert_eq!(
                status.apply(StageEvent::Reset).expect("reset"),
                TranslationStatus::Pending
            );
        }
    }

    #[test]
    fn summary_category_parses_strictly_and_coerces_leniently() {
        assert_eq!(
            "Economics".parse::<SummaryCategory>().expect("known"),
            SummaryCategory::Economics
        );
        assert!(matches!(
            "sports".parse::<SummaryCategory>(),
            Err(AppError::Validation(_))
        ));
        assert_eq!(SummaryCategory::coerce("sports"), SummaryCategory::News);
        assert_eq!(SummaryCategory::coerce(" law "), SummaryCategory::Law);
        assert_eq!(
            serde_json::to_string(&SummaryCategory::Underreported).expect("json"),
            "\"underreported\""
        );
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&EmbeddingStatus::Embedding).expect("json"),
            "\"embedding\""
        );
        assert!(serde_json::from_str::<TranslationStatus>("\"done\"").is_err());
        assert_eq!(
            serde_json::to_string(&TranslationProvider::LibreTranslate).expect("json"),
            "\"libretranslate\""
        );
    }
}
