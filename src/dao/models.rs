//! Stored shape of a game session document.
//!
//! Every field tolerates absence and malformed values: decoding never fails,
//! anything unreadable falls back to its zero value and the domain layer
//! normalises what remains.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use serde_with::{DefaultOnError, serde_as};

use crate::dao::document_store::Fields;

/// Collection holding one document per session.
pub const GAME_SESSIONS_COLLECTION: &str = "game_sessions";

/// Tic-tac-toe session as stored in the shared document.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TicTacToeDocument {
    /// Display name of the game, informational.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub game_type: String,
    /// Nine cells, each `""`, `"X"` or `"O"`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub board: Vec<String>,
    /// `"X"` or `"O"`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub current_turn: String,
    /// `"ongoing"`, `"won"` or `"draw"`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub game_status: String,
    /// Winning symbol, `null` until someone wins.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub winner: Option<String>,
    /// RFC 3339 timestamp of the last write.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub last_updated: String,
    /// First participant of the sorted pair, plays `X`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub player1: String,
    /// Second participant of the sorted pair, plays `O`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub player2: String,
}

/// Memory-match session as stored in the shared document.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryMatchDocument {
    /// Display name of the game, informational.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub game_type: String,
    /// Face of every card, in deck order.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub board_values: Vec<String>,
    /// Face-up flag per card.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub board_revealed: Vec<bool>,
    /// Cards turned this turn and not yet resolved.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub flipped_indices: Vec<usize>,
    /// Pairs found by `player1`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub score_player1: u32,
    /// Pairs found by `player2`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub score_player2: u32,
    /// `"player1"` or `"player2"`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub current_turn: String,
    /// `"ongoing"` or `"finished"`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub game_status: String,
    /// RFC 3339 timestamp of the last write.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub last_updated: String,
    /// First participant of the sorted pair.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub player1: String,
    /// Second participant of the sorted pair.
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub player2: String,
}

/// Decode a stored field map, falling back to the default document.
pub fn decode_document<T>(fields: &Fields) -> T
where
    T: DeserializeOwned + Default,
{
    serde_json::from_value(Value::Object(fields.clone())).unwrap_or_default()
}

/// Encode a document into the field map written to the store.
pub fn encode_document<T: Serialize>(document: &T) -> Fields {
    match serde_json::to_value(document) {
        Ok(Value::Object(fields)) => fields,
        _ => Fields::new(),
    }
}
