//! Session cookies
//!
//! A serialized session rarely fits in one cookie, so it is split into
//! consecutive chunks. One chunk is stored under the base name; several
//! chunks are stored as `<base>.0`, `<base>.1`, ... and the base name is
//! left unwritten. Reading concatenates the chunks back in ordinal order.
//!
//! [`CookieWriter`] is the per-request accumulator every cookie write goes
//! through, whether it comes from the identity backend or from the session
//! chunker. Writes are applied to the response in the order they were queued.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::session::Session;

/// A cookie chunk ready to be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieChunk {
    pub name: String,
    pub value: String,
}

/// Name of the chunk at `index` when a value spans several cookies.
pub fn chunk_name(base: &str, index: usize) -> String {
    format!("{base}.{index}")
}

/// Split `value` into chunks of at most `max_chars` characters.
///
/// A character is never split across two chunks. An empty value yields
/// no chunks at all. The limit applies to the raw value; the jar
/// percent-encodes it on the way out, so the wire size can be larger.
pub fn chunk_value(base: &str, value: &str, max_chars: usize) -> Vec<CookieChunk> {
    let pieces = split_chars(value, max_chars.max(1));

    if pieces.len() == 1 {
        return vec![CookieChunk {
            name: base.to_string(),
            value: pieces[0].to_string(),
        }];
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| CookieChunk {
            name: chunk_name(base, index),
            value: piece.to_string(),
        })
        .collect()
}

fn split_chars(value: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = value;

    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(offset, _)| offset)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }

    pieces
}

/// Reassemble a possibly chunked value from request cookies.
///
/// An unsuffixed `base` cookie wins. Otherwise `<base>.0`, `<base>.1`, ...
/// are joined until the first missing ordinal.
pub fn reassemble<'a, I>(cookies: I, base: &str) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let prefix = format!("{base}.");
    let mut chunks: Vec<(usize, &str)> = Vec::new();

    for (name, value) in cookies {
        if name == base {
            return Some(value.to_string());
        }
        if let Some(index) = name
            .strip_prefix(&prefix)
            .and_then(|suffix| suffix.parse::<usize>().ok())
        {
            chunks.push((index, value));
        }
    }

    chunks.sort_by_key(|(index, _)| *index);

    let mut joined = String::new();
    let mut expected = 0;
    for (index, value) in chunks {
        if index != expected {
            break;
        }
        joined.push_str(value);
        expected += 1;
    }

    (expected > 0).then_some(joined)
}

/// Whether `name` is the base session cookie or one of its chunks.
pub fn is_session_cookie(name: &str, base: &str) -> bool {
    name == base
        || name
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// Build one session chunk cookie.
///
/// Every chunk carries the same attributes: root path, `SameSite=Lax`,
/// readable from scripts, sent over plain http, and a fixed max age.
pub fn session_chunk_cookie(chunk: CookieChunk, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((chunk.name, chunk.value))
        .path("/")
        .same_site(SameSite::Lax)
        .http_only(false)
        .secure(false)
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Create removal cookie for `name` at the root path.
pub fn removal_cookie(name: impl Into<String>) -> Cookie<'static> {
    Cookie::build((name.into(), ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Read/write view over one request's cookies.
#[derive(Debug, Default, Clone)]
pub struct CookieWriter {
    request: Vec<(String, String)>,
    queued: Vec<Cookie<'static>>,
}

impl CookieWriter {
    /// Snapshot the cookies the browser sent.
    pub fn from_jar(jar: &CookieJar) -> Self {
        Self::from_pairs(
            jar.iter()
                .map(|cookie| (cookie.name().to_string(), cookie.value().to_string())),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            request: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
            queued: Vec::new(),
        }
    }

    /// Value of a request cookie.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.request
            .iter()
            .find(|(cookie_name, _)| cookie_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// All request cookies as `(name, value)` pairs.
    pub fn get_all(&self) -> impl Iterator<Item = (&str, &str)> {
        self.request
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Queue a cookie for the response.
    pub fn set(&mut self, cookie: Cookie<'static>) {
        self.queued.push(cookie);
    }

    /// Queue removal of a cookie at the root path.
    pub fn remove(&mut self, name: impl Into<String>) {
        self.queued.push(removal_cookie(name));
    }

    /// Cookies queued so far, in write order.
    pub fn queued(&self) -> &[Cookie<'static>] {
        &self.queued
    }

    /// Reassembled session string found in the request cookies.
    pub fn session_value(&self, base: &str) -> Option<String> {
        reassemble(self.get_all(), base)
    }

    /// Parse the session found in the request cookies.
    ///
    /// Missing and unparseable sessions both read as `None`.
    pub fn session(&self, base: &str) -> Option<Session> {
        let value = self.session_value(base)?;
        match Session::from_cookie_value(&value) {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::debug!(%error, cookie = %base, "Ignoring unparseable session cookie");
                None
            }
        }
    }

    /// Serialize `session` and queue it as one or more chunk cookies.
    ///
    /// Returns the number of cookies written.
    pub fn write_session(
        &mut self,
        base: &str,
        session: &Session,
        chunk_size: usize,
        max_age_secs: i64,
    ) -> Result<usize, crate::error::AppError> {
        let value = session.to_cookie_value()?;
        let chunks = chunk_value(base, &value, chunk_size);
        let written = chunks.len();

        for chunk in chunks {
            self.set(session_chunk_cookie(chunk, max_age_secs));
        }

        Ok(written)
    }

    /// Queue removal of every session cookie the request carried.
    pub fn clear_session(&mut self, base: &str) {
        let names: Vec<String> = self
            .request
            .iter()
            .filter(|(name, _)| is_session_cookie(name, base))
            .map(|(name, _)| name.clone())
            .collect();

        for name in names {
            self.remove(name);
        }
    }

    /// Apply queued cookies to the response jar, in queue order.
    ///
    /// A later cookie with the same name replaces an earlier one.
    pub fn apply(self, jar: CookieJar) -> CookieJar {
        self.queued
            .into_iter()
            .fold(jar, |jar, cookie| jar.add(cookie))
    }
}
