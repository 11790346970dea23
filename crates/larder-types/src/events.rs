use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, display_name: String },

    /// Current content of a user's favorites document.
    /// `favorites` is `None` when the document does not exist yet.
    FavoritesSnapshot {
        user_id: Uuid,
        favorites: Option<Vec<Uuid>>,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_tagged() {
        let cmd = GatewayCommand::Identify { token: "t".into() };
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"type":"Identify","data":{"token":"t"}}"#
        );

        let missing: GatewayEvent = serde_json::from_str(
            r#"{"type":"FavoritesSnapshot","data":{"user_id":"00000000-0000-0000-0000-000000000001","favorites":null}}"#,
        )
        .unwrap();
        assert!(matches!(
            missing,
            GatewayEvent::FavoritesSnapshot { favorites: None, .. }
        ));
    }
}
