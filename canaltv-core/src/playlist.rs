use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::registry::NewChannel;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("missing #EXTM3U header")]
    MissingHeader,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse an extended M3U channel playlist into registry rows.
///
/// Each `#EXTINF` line carries the channel display name after the last
/// comma plus optional `tvg-id`, `tvg-country` and `group-title`
/// attributes; the following non-comment line is the stream URL.
/// Entries without a URL are skipped, not fatal: community playlists are
/// messy and one broken entry must not sink an import.
pub fn parse_m3u(contents: &str) -> Result<Vec<NewChannel>, PlaylistError> {
    if !contents.trim_start().starts_with("#EXTM3U") {
        return Err(PlaylistError::MissingHeader);
    }
    let attr_regex = Regex::new(r#"([A-Za-z0-9-]+)="([^"]*)""#).expect("valid regex");
    let mut channels = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut pending: Option<NewChannel> = None;
    for line in contents.lines().map(|line| line.trim()) {
        if line.starts_with("#EXTINF:") {
            let info = &line[8..];
            let name = info
                .rsplit_once(',')
                .map(|(_, name)| name.trim().to_string())
                .unwrap_or_default();
            let mut tvg_id = None;
            let mut country = None;
            let mut group_title = None;
            for capture in attr_regex.captures_iter(info) {
                let value = capture[2].trim();
                if value.is_empty() {
                    continue;
                }
                match capture[1].to_ascii_lowercase().as_str() {
                    "tvg-id" => tvg_id = Some(value.to_string()),
                    "tvg-country" => country = Some(value.to_string()),
                    "group-title" => group_title = Some(value.to_string()),
                    _ => {}
                }
            }
            if name.is_empty() && tvg_id.is_none() {
                warn!(target: "playlist", line, "skipping EXTINF without name or tvg-id");
                pending = None;
                continue;
            }
            let id = tvg_id.unwrap_or_else(|| slugify(&name));
            pending = Some(NewChannel {
                id,
                name,
                country,
                group_title,
                source_url: String::new(),
            });
        } else if line.starts_with('#') || line.is_empty() {
            continue;
        } else if let Some(mut channel) = pending.take() {
            channel.source_url = line.to_string();
            if seen_ids.insert(channel.id.clone()) {
                channels.push(channel);
            } else {
                warn!(target: "playlist", id = %channel.id, "skipping duplicate channel id");
            }
        }
    }
    if pending.is_some() {
        warn!(target: "playlist", "playlist ended with an EXTINF entry missing its URL");
    }
    Ok(channels)
}

pub fn load_m3u(path: impl AsRef<Path>) -> Result<Vec<NewChannel>, PlaylistError> {
    let contents = std::fs::read_to_string(path)?;
    parse_m3u(&contents)
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="globo-sp" tvg-country="BR" group-title="Notícias",Globo São Paulo
https://cdn.example.com/globo/index.m3u8
#EXTINF:-1 group-title="Esportes",SporTV HD
https://cdn.example.com/sportv/master.m3u8

#EXTINF:-1,Canal Sem URL
#EXTINF:-1 tvg-id="globo-sp",Globo Duplicada
https://mirror.example.com/globo.m3u8
"#;

    #[test]
    fn parses_attributes_and_urls() {
        let channels = parse_m3u(SAMPLE).unwrap();
        assert_eq!(channels.len(), 2);

        assert_eq!(channels[0].id, "globo-sp");
        assert_eq!(channels[0].name, "Globo São Paulo");
        assert_eq!(channels[0].country.as_deref(), Some("BR"));
        assert_eq!(channels[0].group_title.as_deref(), Some("Notícias"));
        assert_eq!(channels[0].source_url, "https://cdn.example.com/globo/index.m3u8");

        // No tvg-id: the slugified display name becomes the id.
        assert_eq!(channels[1].id, "sportv-hd");
        assert_eq!(channels[1].group_title.as_deref(), Some("Esportes"));
    }

    #[test]
    fn rejects_playlist_without_header() {
        let result = parse_m3u("#EXTINF:-1,Canal\nhttp://example.com/a.m3u8");
        assert!(matches!(result, Err(PlaylistError::MissingHeader)));
    }

    #[test]
    fn entry_without_url_is_skipped() {
        let channels = parse_m3u(SAMPLE).unwrap();
        assert!(channels.iter().all(|c| !c.source_url.is_empty()));
        assert!(!channels.iter().any(|c| c.name == "Canal Sem URL"));
    }

    #[test]
    fn duplicate_ids_keep_first_entry() {
        let channels = parse_m3u(SAMPLE).unwrap();
        let globo: Vec<_> = channels.iter().filter(|c| c.id == "globo-sp").collect();
        assert_eq!(globo.len(), 1);
        assert_eq!(globo[0].name, "Globo São Paulo");
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Canal 21 (São Paulo)"), "canal-21-s-o-paulo");
        assert_eq!(slugify("  TV!  "), "tv");
    }
}
