//! Rendering of lobby state into platform message content

use crate::types::{ButtonStyle, Component, UserId};

/// Shown to a user who tries to start a second lobby in a location
pub const ALREADY_RUNNING_MESSAGE: &str = "A game is already running in this channel!";

/// Component id of the join button for a game
pub fn join_component_id(game_name: &str) -> String {
    format!("{}-join", game_name)
}

/// Component id of the leave button for a game
pub fn leave_component_id(game_name: &str) -> String {
    format!("{}-leave", game_name)
}

/// Mention token for a user
pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

/// Render the join prompt with the current members in the given order.
///
/// Pure and deterministic, so it is safe to call while holding a lobby lock.
pub fn join_prompt(game_title: &str, members: &[UserId]) -> String {
    let mut content = format!(
        "A {} game is starting. Join now!\nCurrent players:",
        game_title
    );
    for user_id in members {
        content.push(' ');
        content.push_str(&mention(user_id));
    }
    content
}

/// Replaces the join prompt once a lobby has been reclaimed
pub fn closed_notice(game_title: &str) -> String {
    format!("This {} game lobby has closed.", game_title)
}

/// Join and leave buttons attached to the lobby message
pub fn lobby_controls(game_name: &str) -> Vec<Component> {
    vec![
        Component {
            custom_id: join_component_id(game_name),
            label: "Join".to_string(),
            style: ButtonStyle::Primary,
        },
        Component {
            custom_id: leave_component_id(game_name),
            label: "Leave".to_string(),
            style: ButtonStyle::Secondary,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prompt() {
        assert_eq!(
            join_prompt("Secret Hitler", &[]),
            "A Secret Hitler game is starting. Join now!\nCurrent players:"
        );
    }

    #[test]
    fn test_prompt_lists_members_in_order() {
        let members = vec!["alice".to_string(), "bob".to_string()];
        let content = join_prompt("Secret Hitler", &members);

        assert!(content.ends_with("Current players: <@alice> <@bob>"));
        assert_eq!(content, join_prompt("Secret Hitler", &members));
    }

    #[test]
    fn test_closed_notice_names_game() {
        assert_eq!(
            closed_notice("Secret Hitler"),
            "This Secret Hitler game lobby has closed."
        );
    }

    #[test]
    fn test_controls_use_game_tokens() {
        let controls = lobby_controls("secret-hitler");

        assert_eq!(controls.len(), 2);
        assert_eq!(controls[0].custom_id, "secret-hitler-join");
        assert_eq!(controls[0].style, ButtonStyle::Primary);
        assert_eq!(controls[1].custom_id, "secret-hitler-leave");
        assert_eq!(controls[1].label, "Leave");
    }
}
