//! Interactive collection of encoding parameters.
//!
//! Every answer goes through a pure `parse_*` function, so the rules can be
//! tested without a terminal. [`InputCollector`] drives a [`Prompter`] and
//! applies the per-field [`RetryPolicy`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enumerate::SortMode;
use crate::error::{Result, StillreelError};
use crate::{EncodingConfig, HoldDurations, QualityTier};

pub const MIN_DELAY_MS: u32 = 10;

/// Quality menu entries: label shown to the user, tier name.
pub const QUALITY_MENU: &[(&str, &str)] = &[
    ("Low (1000k)", "low"),
    ("Medium (2000k)", "medium"),
    ("High (3000k)", "high"),
    ("Very High (4000k)", "very_high"),
    ("Ultra High (5000k)", "ultra_high"),
    ("Custom", "custom"),
];

pub const SORT_MENU: &[(&str, SortMode)] = &[
    ("By name (natural order)", SortMode::ByName),
    ("By modification time", SortMode::ByModified),
];

/// Console seam. The binary backs it with `dialoguer`.
pub trait Prompter {
    /// Ask a question and return the raw answer.
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Print an informational line.
    fn say(&mut self, line: &str);
}

/// What happens after an invalid answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Report the problem and ask again
    Retry,
    /// Give up on the whole run
    Abandon,
}

/// Retry policy per question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptPolicy {
    pub delay: RetryPolicy,
    pub sort_mode: RetryPolicy,
    pub hold: RetryPolicy,
    pub quality: RetryPolicy,
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self {
            delay: RetryPolicy::Retry,
            sort_mode: RetryPolicy::Retry,
            hold: RetryPolicy::Abandon,
            quality: RetryPolicy::Abandon,
        }
    }
}

fn parse_int(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| StillreelError::invalid(format!("'{}' is not a whole number.", trimmed)))
}

pub fn parse_delay(input: &str) -> Result<u32> {
    let n = parse_int(input)?;
    if n < i64::from(MIN_DELAY_MS) {
        return Err(StillreelError::invalid(format!(
            "The delay must be at least {} milliseconds.",
            MIN_DELAY_MS
        )));
    }
    u32::try_from(n).map_err(|_| StillreelError::invalid("The delay is too large."))
}

pub fn parse_sort_choice(input: &str) -> Result<SortMode> {
    let n = parse_int(input)?;
    usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| SORT_MENU.get(i))
        .map(|(_, mode)| *mode)
        .ok_or_else(|| StillreelError::invalid("Invalid choice."))
}

/// `y` (any case, surrounding whitespace ignored) is yes; everything else is no.
pub fn parse_yes_no(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("y")
}

/// Range check for both hold answers, run once both have been given.
pub fn validate_holds(first_ms: i64, last_ms: i64) -> Result<HoldDurations> {
    if first_ms <= 0 || last_ms <= 0 {
        return Err(StillreelError::invalid("The duration must be a positive integer."));
    }
    let to_ms =
        |n: i64| u32::try_from(n).map_err(|_| StillreelError::invalid("The duration is too large."));
    Ok(HoldDurations {
        first_ms: to_ms(first_ms)?,
        last_ms: to_ms(last_ms)?,
    })
}

/// Menu number to tier name.
pub fn parse_quality_choice(input: &str) -> Result<&'static str> {
    let n = parse_int(input)?;
    usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| QUALITY_MENU.get(i))
        .map(|(_, name)| *name)
        .ok_or_else(|| StillreelError::invalid("Invalid choice."))
}

/// Trim the answer and make sure it ends in `k`.
pub fn normalize_bitrate(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(StillreelError::invalid("The bitrate cannot be empty."));
    }
    if trimmed.ends_with('k') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}k", trimmed))
    }
}

pub struct InputCollector<'p, P: Prompter> {
    prompter: &'p mut P,
    policy: PromptPolicy,
}

impl<'p, P: Prompter> InputCollector<'p, P> {
    pub fn new(prompter: &'p mut P, policy: PromptPolicy) -> Self {
        Self { prompter, policy }
    }

    /// Run the whole question sequence.
    ///
    /// An invalid answer under [`RetryPolicy::Abandon`] ends collection with
    /// [`StillreelError::InvalidInput`]; the caller reports it.
    pub fn collect(&mut self) -> Result<EncodingConfig> {
        let delay_ms = self.ask_until(
            "Enter the delay between frames in milliseconds (must be at least 10ms)",
            self.policy.delay,
            parse_delay,
        )?;

        self.prompter.say("Select the sort order:");
        for (i, (label, _)) in SORT_MENU.iter().enumerate() {
            self.prompter.say(&format!("{}. {}", i + 1, label));
        }
        let sort_mode = self.ask_until(
            &format!("Enter your choice (1-{})", SORT_MENU.len()),
            self.policy.sort_mode,
            parse_sort_choice,
        )?;

        let answer = self
            .prompter
            .ask("Do you want to hold the first and last frames for a different duration? (y/n)")?;
        let hold = if parse_yes_no(&answer) {
            Some(self.ask_holds()?)
        } else {
            None
        };

        self.prompter.say("Select the quality option:");
        for (i, (label, _)) in QUALITY_MENU.iter().enumerate() {
            self.prompter.say(&format!("{}. {}", i + 1, label));
        }
        let tier_name = self.ask_until(
            &format!("Enter your choice (1-{})", QUALITY_MENU.len()),
            self.policy.quality,
            parse_quality_choice,
        )?;
        let custom = if tier_name == QualityTier::CUSTOM {
            Some(self.ask_until(
                "Enter custom bitrate (e.g., 6000k or 6000)",
                RetryPolicy::Retry,
                normalize_bitrate,
            )?)
        } else {
            None
        };
        let quality = QualityTier::from_name(tier_name, custom.as_deref());

        let config = EncodingConfig {
            delay_ms,
            sort_mode,
            hold,
            quality,
        };
        debug!(?config, "collected encoding config");
        Ok(config)
    }

    /// Both durations are asked before either is range checked. A non-integer
    /// answer is handled on the spot.
    fn ask_holds(&mut self) -> Result<HoldDurations> {
        loop {
            let first_ms = self.ask_until(
                "Enter the duration to hold the first frame in milliseconds",
                self.policy.hold,
                parse_int,
            )?;
            let last_ms = self.ask_until(
                "Enter the duration to hold the last frame in milliseconds",
                self.policy.hold,
                parse_int,
            )?;
            match validate_holds(first_ms, last_ms) {
                Ok(holds) => return Ok(holds),
                Err(StillreelError::InvalidInput(msg)) if self.policy.hold == RetryPolicy::Retry => {
                    self.prompter.say(&format!("Invalid input: {}", msg))
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn ask_until<T>(
        &mut self,
        prompt: &str,
        policy: RetryPolicy,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<T> {
        loop {
            let answer = self.prompter.ask(prompt)?;
            match parse(&answer) {
                Ok(value) => return Ok(value),
                Err(StillreelError::InvalidInput(msg)) => match policy {
                    RetryPolicy::Retry => self.prompter.say(&format!("Invalid input: {}", msg)),
                    RetryPolicy::Abandon => return Err(StillreelError::InvalidInput(msg)),
                },
                Err(e) => return Err(e),
            }
        }
    }
}
