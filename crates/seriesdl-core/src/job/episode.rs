//! Episode, server and stream types plus the episode ordering key.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Canonical series identity resolved from a source URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesInfo {
    /// Site-scoped series identifier.
    pub series_id: String,
    /// Human-readable series title.
    pub title: String,
}

/// One episode of a series, as enumerated by the site client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Site-defined episode id ("1", "1.5", "OVA1").
    pub id: String,
    /// Episode title.
    pub title: String,
    /// Opaque token used to resolve servers for this episode.
    pub token: String,
}

/// Stream type offered by an episode server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StreamKind {
    /// Burned-in subtitles.
    #[serde(rename = "Hard Sub")]
    HardSub,
    /// Selectable subtitle track.
    #[default]
    #[serde(rename = "Soft Sub")]
    SoftSub,
    /// Dubbed audio (with subtitles).
    #[serde(rename = "Dub (with subs)")]
    Dub,
}

impl StreamKind {
    /// Display label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::HardSub => "Hard Sub",
            Self::SoftSub => "Soft Sub",
            Self::Dub => "Dub (with subs)",
        }
    }

    /// Wire name used by site APIs.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::HardSub => "sub",
            Self::SoftSub => "softsub",
            Self::Dub => "dub",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A server offering one stream of an episode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeServer {
    /// Site-scoped server id, used to resolve stream data.
    pub server_id: String,
    /// Display name ("Server 1").
    pub server_name: String,
    /// Stream type offered.
    pub kind: StreamKind,
}

/// Resolved, playable stream data for one episode.
///
/// The payload is opaque to the orchestrator; the site client produces it
/// and consumes it again in `download_episode`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSource {
    /// Primary stream URL.
    pub url: String,
    /// Site-specific extras (headers, alternate sources, subtitles).
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Choose a server by (preferred stream type, preferred server name),
/// degrading gracefully: exact match, then type-only match, then the
/// first available server.
#[must_use]
pub fn choose_server(
    servers: &[EpisodeServer],
    prefer_kind: StreamKind,
    prefer_server: &str,
) -> Option<EpisodeServer> {
    if servers.is_empty() {
        return None;
    }
    servers
        .iter()
        .find(|s| s.kind == prefer_kind && s.server_name.eq_ignore_ascii_case(prefer_server))
        .or_else(|| servers.iter().find(|s| s.kind == prefer_kind))
        .or_else(|| servers.first())
        .cloned()
}

/// Ordering key for heterogeneous episode ids.
///
/// Splits an id into a lowercased non-numeric prefix and the first
/// numeric run (parsed as f64, so "1.5" sorts between "1" and "2").
/// Plain numbers sort before prefixed ids, so "OVA1" lands in its own
/// band after "12".
#[derive(Clone, Debug)]
pub struct EpisodeKey {
    prefix: String,
    number: Option<f64>,
}

impl PartialEq for EpisodeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EpisodeKey {}

impl PartialOrd for EpisodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EpisodeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix.cmp(&other.prefix).then_with(|| {
            match (self.number, other.number) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                // Unnumbered ids sort after numbered ones with the same prefix
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }
}

/// Compute the site-independent ordering key for an episode id.
#[must_use]
pub fn episode_sort_key(id: &str) -> EpisodeKey {
    let id = id.trim();
    let digit_start = id.find(|c: char| c.is_ascii_digit());

    match digit_start {
        Some(start) => {
            let prefix = id[..start].trim().to_lowercase();
            let rest = &id[start..];
            let num_end = rest
                .char_indices()
                .take_while(|(i, c)| {
                    c.is_ascii_digit() || (*c == '.' && rest[..*i].contains(|d: char| d.is_ascii_digit()))
                })
                .last()
                .map_or(0, |(i, c)| i + c.len_utf8());
            let number = rest[..num_end].trim_end_matches('.').parse::<f64>().ok();
            EpisodeKey { prefix, number }
        }
        None => EpisodeKey {
            prefix: id.to_lowercase(),
            number: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str, name: &str, kind: StreamKind) -> EpisodeServer {
        EpisodeServer {
            server_id: id.to_string(),
            server_name: name.to_string(),
            kind,
        }
    }

    #[test]
    fn episode_keys_order_plain_numbers() {
        assert!(episode_sort_key("1") < episode_sort_key("1.5"));
        assert!(episode_sort_key("1.5") < episode_sort_key("2"));
        assert!(episode_sort_key("9") < episode_sort_key("10"));
    }

    #[test]
    fn episode_keys_order_prefixed_ids_in_own_band() {
        assert!(episode_sort_key("12") < episode_sort_key("OVA1"));
        assert!(episode_sort_key("OVA1") < episode_sort_key("OVA2"));
        assert_eq!(episode_sort_key("ova1"), episode_sort_key("OVA1"));
    }

    #[test]
    fn range_selection_is_inclusive() {
        let ids = ["1", "1.5", "2", "3", "OVA1"];
        let start = episode_sort_key("1.5");
        let end = episode_sort_key("3");
        let selected: Vec<_> = ids
            .iter()
            .filter(|id| {
                let key = episode_sort_key(id);
                start <= key && key <= end
            })
            .copied()
            .collect();
        assert_eq!(selected, vec!["1.5", "2", "3"]);
    }

    #[test]
    fn choose_server_prefers_exact_match() {
        let servers = vec![
            server("a", "Server 1", StreamKind::HardSub),
            server("b", "Server 2", StreamKind::SoftSub),
            server("c", "Server 1", StreamKind::SoftSub),
        ];
        let chosen = choose_server(&servers, StreamKind::SoftSub, "Server 1").unwrap();
        assert_eq!(chosen.server_id, "c");
    }

    #[test]
    fn choose_server_degrades_to_kind_then_first() {
        let servers = vec![
            server("a", "Server 1", StreamKind::HardSub),
            server("b", "Server 2", StreamKind::SoftSub),
        ];
        // Preferred name missing: type-only match wins
        let chosen = choose_server(&servers, StreamKind::SoftSub, "Server 9").unwrap();
        assert_eq!(chosen.server_id, "b");
        // Preferred type missing entirely: first available
        let chosen = choose_server(&servers, StreamKind::Dub, "Server 9").unwrap();
        assert_eq!(chosen.server_id, "a");
        assert!(choose_server(&[], StreamKind::SoftSub, "Server 1").is_none());
    }

    #[test]
    fn stream_kind_serializes_as_label() {
        let json = serde_json::to_string(&StreamKind::SoftSub).unwrap();
        assert_eq!(json, "\"Soft Sub\"");
        let kind: StreamKind = serde_json::from_str("\"Dub (with subs)\"").unwrap();
        assert_eq!(kind, StreamKind::Dub);
    }
}
