//! Built-in verification scenarios for the player admin app

use crate::errors::{HarnessError, Result};
use crate::locator::{Locator, TextMatch};
use crate::scenario::Scenario;

pub const MUTE_DURATION_PLACEHOLDER: &str = "Enter duration (e.g., 10 minutes, 2 hours, 1 day)";
pub const MUTE_REASON_PLACEHOLDER: &str = "Mute reason";

/// Player the scenarios act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTarget {
    pub id: u32,
    pub display_name: String,
}

impl Default for PlayerTarget {
    fn default() -> Self {
        Self {
            id: 1,
            display_name: "playerone".to_string(),
        }
    }
}

/// Name and one-line summary of every built-in scenario
pub const BUILTIN: &[(&str, &str)] = &[
    (
        "mute-dialog",
        "Player page: Actions tab opens a Mute dialog with heading, reason and duration fields",
    ),
    (
        "mute-wager-forms",
        "Players table: Mute form keeps typed values and does not leak into the Wager form",
    ),
];

/// Look up a built-in scenario by name
pub fn builtin(name: &str, player: &PlayerTarget) -> Result<Scenario> {
    match name {
        "mute-dialog" => mute_dialog(player),
        "mute-wager-forms" => mute_wager_forms(),
        other => Err(HarnessError::InvalidScenario(format!(
            "unknown scenario '{}' (available: {})",
            other,
            BUILTIN
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Deep link to a player, switch to Actions, open the Mute dialog
pub fn mute_dialog(player: &PlayerTarget) -> Result<Scenario> {
    let dialog = Locator::role("dialog");
    let mute = Locator::role_named("button", "Mute");

    Ok(Scenario::new("mute-dialog")
        .describe(BUILTIN[0].1)
        .navigate(format!("#/player/{}", player.id))
        .click(Locator::role_named("tab", "Actions"))
        .assert_visible(mute.clone())
        .click(mute)
        .assert_visible(dialog.clone())
        .assert_text(
            dialog.get_by_role_named("heading", TextMatch::contains("Mute")),
            TextMatch::contains(player.display_name.as_str()),
        )
        .assert_visible(dialog.get_by_placeholder(MUTE_REASON_PLACEHOLDER))
        .assert_visible(dialog.get_by_placeholder(MUTE_DURATION_PLACEHOLDER))
        .capture())
}

/// Open the first player from the table, fill the Mute form, switch to Wager
pub fn mute_wager_forms() -> Result<Scenario> {
    let dialog = Locator::css("div[role='dialog']")?;
    let duration = dialog.locator("input[name=\"duration\"]")?;
    let reason = dialog.locator("textarea[name=\"reason\"]")?;

    Ok(Scenario::new("mute-wager-forms")
        .describe(BUILTIN[1].1)
        .navigate("#/players")
        .click(Locator::css("tbody > tr:first-child")?)
        .assert_visible(dialog.clone())
        .click(dialog.get_by_role_named("button", "Mute"))
        .fill(duration.clone(), "1d")
        .fill(reason.clone(), "Test mute reason")
        .assert_value(duration.clone(), "1d")
        .assert_value(reason.clone(), "Test mute reason")
        .click(dialog.get_by_role_named("button", "Wager"))
        .assert_hidden(duration)
        .assert_hidden(reason)
        .assert_value(dialog.get_by_role_named("textbox", "Reason"), "")
        .capture())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Step;

    #[test]
    fn test_builtin_lookup() {
        let player = PlayerTarget::default();
        for (name, _) in BUILTIN {
            let scenario = builtin(name, &player).unwrap();
            assert_eq!(scenario.name, *name);
            assert!(scenario.validate().is_ok());
            assert_eq!(scenario.steps.last(), Some(&Step::Capture));
        }
        assert!(matches!(
            builtin("nope", &player),
            Err(HarnessError::InvalidScenario(_))
        ));
    }

    #[test]
    fn test_mute_dialog_uses_player() {
        let player = PlayerTarget {
            id: 42,
            display_name: "somebody".to_string(),
        };
        let scenario = mute_dialog(&player).unwrap();
        assert_eq!(
            scenario.steps[0],
            Step::Navigate {
                to: "#/player/42".to_string()
            }
        );
        assert!(scenario.steps.iter().any(|s| matches!(
            s,
            Step::AssertText { expected, .. } if *expected == TextMatch::contains("somebody")
        )));
    }
}
