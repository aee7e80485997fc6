//! Static client directory used for recipient autocomplete.

use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::error::DirectoryError;
use crate::message::ContactInfo;

/// One client as listed in the directory file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientEntry {
    #[serde(alias = "NombreCliente", alias = "nombre")]
    pub name: String,
    #[serde(
        default,
        alias = "Telefono",
        alias = "telefono",
        deserialize_with = "string_or_number"
    )]
    pub phone: String,
    #[serde(default, alias = "empresa", alias = "Empresa")]
    pub company: Option<String>,
}

impl ClientEntry {
    pub fn contact(&self) -> ContactInfo {
        ContactInfo {
            name: self.name.clone(),
            phone: self.phone.clone(),
            company: self.company.clone(),
        }
    }
}

/// Phone numbers are often stored as bare JSON numbers
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientDirectory {
    clients: Vec<ClientEntry>,
}

impl ClientDirectory {
    pub fn new(clients: Vec<ClientEntry>) -> Self {
        Self { clients }
    }

    /// Parse a directory document.
    ///
    /// The client list may sit under `clientes` or `clients`, or be the
    /// document itself. Entries that do not parse are skipped.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let doc: serde_json::Value =
            serde_json::from_str(json).map_err(|e| DirectoryError::ParseError(e.to_string()))?;

        let list = match &doc {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(map) => match map.get("clientes").or(map.get("clients")) {
                Some(serde_json::Value::Array(items)) => items,
                _ => return Err(DirectoryError::MissingClientList),
            },
            _ => return Err(DirectoryError::MissingClientList),
        };

        let mut clients = Vec::with_capacity(list.len());
        for (index, item) in list.iter().enumerate() {
            match ClientEntry::deserialize(item) {
                Ok(entry) if !entry.name.trim().is_empty() => clients.push(entry),
                Ok(_) => warn!(index, "skipping client entry without a name"),
                Err(e) => warn!(index, error = %e, "skipping malformed client entry"),
            }
        }

        info!(count = clients.len(), "client directory loaded");
        Ok(Self { clients })
    }

    /// Recoverable load: a broken directory becomes an empty one
    pub fn load_or_empty(json: &str) -> Self {
        Self::from_json(json).unwrap_or_else(|e| {
            warn!(error = %e, "client directory unavailable, continuing without it");
            Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClientEntry> {
        self.clients.get(index)
    }

    /// Case-insensitive name-prefix search, at most `limit` matches.
    /// Returns indices so callers can select by position.
    pub fn filter(&self, query: &str, limit: usize) -> Vec<(usize, &ClientEntry)> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.clients
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name.to_lowercase().starts_with(&query))
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "clientes": [
            {"NombreCliente": "Fernando Loyola", "Telefono": 983832001, "empresa": "Minera Sur"},
            {"NombreCliente": "Fabiola Ríos", "Telefono": "+51 912 000 111"},
            {"NombreCliente": "Gustavo Paz", "Telefono": null},
            {"Telefono": "999"}
        ]
    }"#;

    #[test]
    fn test_parses_original_field_names() {
        let dir = ClientDirectory::from_json(SAMPLE).unwrap();
        assert_eq!(dir.len(), 3);
        let first = dir.get(0).unwrap();
        assert_eq!(first.phone, "983832001");
        assert_eq!(first.company.as_deref(), Some("Minera Sur"));
        assert_eq!(dir.get(2).unwrap().phone, "");
    }

    #[test]
    fn test_english_keys_and_bare_array() {
        let dir = ClientDirectory::from_json(
            r#"[{"name": "Ana", "phone": "1", "company": "X"}]"#,
        )
        .unwrap();
        assert_eq!(dir.get(0).unwrap().contact().company.as_deref(), Some("X"));
    }

    #[test]
    fn test_prefix_filter() {
        let dir = ClientDirectory::from_json(SAMPLE).unwrap();
        let matches = dir.filter("fa", 10);
        let names: Vec<_> = matches.iter().map(|(_, c)| c.name.as_str()).collect();
        assert_eq!(names, vec!["Fabiola Ríos"]);
        assert_eq!(dir.filter("f", 10).len(), 2);
        assert_eq!(dir.filter("f", 1).len(), 1);
        assert!(dir.filter("  ", 10).is_empty());
        assert!(dir.filter("loyola", 10).is_empty());
    }

    #[test]
    fn test_missing_list_is_error_but_recoverable() {
        assert_eq!(
            ClientDirectory::from_json(r#"{"otros": []}"#),
            Err(DirectoryError::MissingClientList)
        );
        assert!(matches!(
            ClientDirectory::from_json("not json"),
            Err(DirectoryError::ParseError(_))
        ));
        assert!(ClientDirectory::load_or_empty("not json").is_empty());
    }
}
