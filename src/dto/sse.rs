use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{format_system_time, match_state::MatchState},
    state::board::{Board, BoardPhase, BoardStatus, ThrowPayload},
};

#[derive(Clone, Debug, PartialEq)]
/// Dispatched payload carried across the broadcast channel.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
    /// Board the event is about; subscribers filtering on a board skip other boards.
    pub board_id: Option<String>,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
            board_id: None,
        })
    }

    /// Scope the event to a single board.
    pub fn for_board(mut self, board_id: impl Into<String>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    /// Whether a subscriber with `filter` should receive this event.
    pub fn visible_to(&self, filter: Option<&str>) -> bool {
        match (filter, self.board_id.as_deref()) {
            (Some(wanted), Some(board)) => wanted == board,
            _ => true,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a board; the access token is never exposed in clear.
pub struct BoardView {
    pub id: String,
    pub name: String,
    pub status: BoardStatus,
    pub phase: Option<BoardPhase>,
    pub last_throw: Option<LastThrowView>,
    pub last_update: String,
    pub credentials: CredentialsView,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Last throw recorded on a board.
pub struct LastThrowView {
    #[serde(flatten)]
    pub payload: ThrowPayload,
    pub at: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Masked device credentials.
pub struct CredentialsView {
    pub serial_number: Option<String>,
    pub access_token_masked: Option<String>,
    pub configured: bool,
}

impl From<&Board> for BoardView {
    fn from(board: &Board) -> Self {
        Self {
            id: board.id.clone(),
            name: board.name.clone(),
            status: board.status,
            phase: board.phase,
            last_throw: board.last_throw.as_ref().map(|last| LastThrowView {
                payload: last.payload.clone(),
                at: last.at.clone(),
            }),
            last_update: format_system_time(board.last_update),
            credentials: CredentialsView {
                serial_number: board.credentials.serial().map(str::to_owned),
                access_token_masked: board.credentials.token_ref().map(mask_token),
                configured: board.credentials.token_ref().is_some(),
            },
        }
    }
}

/// Mask a token for display: first four and last two characters survive.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 6 {
        return "•".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent once to every new subscriber.
pub struct BoardsSnapshot {
    pub boards: Vec<BoardView>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent once to every new subscriber, after the boards snapshot.
pub struct MatchesSnapshot {
    pub matches: Vec<MatchState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::board::BoardCredentials;

    #[test]
    fn masks_long_and_short_tokens() {
        assert_eq!(mask_token("abcdefghij"), "abcd…ij");
        assert_eq!(mask_token("abcdef"), "••••••");
        assert_eq!(mask_token(""), "");
    }

    #[test]
    fn board_view_hides_token() {
        let mut board = Board::new("board-1", "Board 1");
        board.credentials = BoardCredentials::Configured {
            serial: "SN-1".into(),
            token_ref: "secret-token-42".into(),
        };
        let view = BoardView::from(&board);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("secret-token-42"));
        assert!(view.credentials.configured);
        assert_eq!(view.credentials.access_token_masked.as_deref(), Some("secr…42"));
    }

    #[test]
    fn board_filter_only_applies_to_board_scoped_events() {
        let board_event = ServerEvent::json(Some("board.update".to_string()), &1)
            .unwrap()
            .for_board("board-1");
        let match_event = ServerEvent::json(Some("match.update".to_string()), &1).unwrap();

        assert!(board_event.visible_to(None));
        assert!(board_event.visible_to(Some("board-1")));
        assert!(!board_event.visible_to(Some("board-2")));
        assert!(match_event.visible_to(Some("board-2")));
    }
}
