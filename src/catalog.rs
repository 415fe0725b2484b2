//! Character catalog fetch.
//!
//! The only REST surface: `GET /characters` returns the selectable
//! characters before a session begins.

use crate::state::Character;
use crate::{AvatalkError, Result};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CharacterList {
    #[serde(default)]
    characters: Vec<Character>,
}

/// Fetch the character catalog from the backend.
pub async fn fetch_characters(http_base_url: &str) -> Result<Vec<Character>> {
    let url = format!("{}/characters", http_base_url);
    let response = reqwest::get(&url)
        .await
        .map_err(|e| AvatalkError::CatalogError(format!("request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AvatalkError::CatalogError(format!(
            "unexpected status {} from {}",
            response.status(),
            url
        )));
    }

    let list: CharacterList = response
        .json()
        .await
        .map_err(|e| AvatalkError::CatalogError(format!("invalid catalog payload: {}", e)))?;

    info!(count = list.characters.len(), "fetched character catalog");
    Ok(list.characters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_payload_deserializes() {
        let list: CharacterList = serde_json::from_str(
            r#"{"characters":[{
                "id":"miku",
                "name":"Miku",
                "image_url":"https://x/miku.png",
                "live2d_model_info":{"url":"https://x/model.json","kScale":0.15}
            }]}"#,
        )
        .unwrap();
        assert_eq!(list.characters.len(), 1);
        assert_eq!(list.characters[0].id, "miku");
        assert_eq!(list.characters[0].live2d_model_info.url, "https://x/model.json");
    }

    #[test]
    fn empty_catalog_defaults() {
        let list: CharacterList = serde_json::from_str("{}").unwrap();
        assert!(list.characters.is_empty());
    }
}
