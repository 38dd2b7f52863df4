use std::fmt;
use std::str::FromStr;

use url::Url;

/// A parsed notification target URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Discord { webhook_id: String, token: String },
    Json { url: Url },
    Ntfy { server: Url, topic: String },
    Telegram { bot_token: String, chat_ids: Vec<String> },
}

impl Target {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Discord { .. } => "discord",
            Self::Json { .. } => "json",
            Self::Ntfy { .. } => "ntfy",
            Self::Telegram { .. } => "tgram",
        }
    }
}

impl fmt::Display for Target {
    /// Redacted form, safe for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discord { webhook_id, .. } => write!(f, "discord://{}/***", webhook_id),
            Self::Json { url } => write!(f, "{}{}", url.origin().ascii_serialization(), url.path()),
            Self::Ntfy { server, topic } => {
                write!(f, "{}/{}", server.origin().ascii_serialization(), topic)
            }
            Self::Telegram { chat_ids, .. } => write!(f, "tgram://***/{}", chat_ids.join("/")),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let uri = uri.trim();
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| "missing scheme (expected e.g. discord://...)".to_string())?;

        // Bot tokens contain ':' so the remainder is split by hand rather
        // than parsed as an authority.
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        match scheme.to_lowercase().as_str() {
            "discord" => match segments.as_slice() {
                [id, token] => Ok(Self::Discord {
                    webhook_id: id.to_string(),
                    token: token.to_string(),
                }),
                _ => Err("expected discord://WEBHOOK_ID/WEBHOOK_TOKEN".into()),
            },
            "json" | "jsons" => {
                let http_scheme = if scheme.eq_ignore_ascii_case("jsons") { "https" } else { "http" };
                let url = http_url(http_scheme, rest)?;
                Ok(Self::Json { url })
            }
            "ntfy" | "ntfys" => {
                let http_scheme = if scheme.eq_ignore_ascii_case("ntfys") { "https" } else { "http" };
                let (host, topic) = match segments.as_slice() {
                    [host, topic] => (*host, *topic),
                    _ => return Err("expected ntfy://HOST/TOPIC".into()),
                };
                let server = http_url(http_scheme, host)?;
                Ok(Self::Ntfy {
                    server,
                    topic: topic.to_string(),
                })
            }
            "tgram" => match segments.split_first() {
                Some((token, chats)) if !chats.is_empty() => Ok(Self::Telegram {
                    bot_token: token.to_string(),
                    chat_ids: chats.iter().map(|c| c.to_string()).collect(),
                }),
                _ => Err("expected tgram://BOT_TOKEN/CHAT_ID".into()),
            },
            other => Err(format!("unsupported scheme '{}'", other)),
        }
    }
}

fn http_url(scheme: &str, rest: &str) -> Result<Url, String> {
    let url = Url::parse(&format!("{}://{}", scheme, rest)).map_err(|e| e.to_string())?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".into());
    }
    Ok(url)
}
