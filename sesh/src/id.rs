use std::{fmt, str::FromStr};

use futures::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result, Role};

/// The maximum length of an identification line, including the line ending.
const MAX_LINE_LEN: usize = 255;

/// The maximum count of lines the peer may send before its identification.
const MAX_PRELUDE_LINES: usize = 20;

/// The SSH identification string,
/// as described in [RFC4253 Section 4.2](https://datatracker.ietf.org/doc/html/rfc4253#section-4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    /// The protocol version, `2.0` or the backward-compatible `1.99`.
    pub protoversion: String,

    /// The software name and version.
    pub softwareversion: String,

    /// Optional free-form comments.
    pub comments: Option<String>,
}

impl Id {
    /// Create a protocol `2.0` identifier.
    pub fn v2(softwareversion: impl Into<String>, comments: Option<impl Into<String>>) -> Self {
        Self {
            protoversion: "2.0".into(),
            softwareversion: softwareversion.into(),
            comments: comments.map(Into::into),
        }
    }

    /// Whether the peer speaks a protocol version we are able to talk to.
    pub fn is_v2_compatible(&self) -> bool {
        matches!(self.protoversion.as_str(), "2.0" | "1.99")
    }

    /// Read the peer's [`Id`], skipping the text lines sent before it.
    pub async fn from_async_reader(
        reader: &mut (impl AsyncBufRead + Unpin),
        role: Role,
    ) -> Result<Self> {
        for _ in 0..=MAX_PRELUDE_LINES {
            let line = read_line(reader).await?;

            if !line.starts_with("SSH-") {
                tracing::debug!("Skipping pre-identification text from the {role}: {line:?}");

                continue;
            }

            let id: Self = line.parse().map_err(|_| Error::PeerDiagnostic {
                role,
                text: line.clone(),
            })?;

            if !id.is_v2_compatible() {
                return Err(Error::UnsupportedVersion {
                    role,
                    version: id.protoversion,
                });
            }

            return Ok(id);
        }

        Err(Error::Overflow {
            what: "lines before the identification string",
            limit: MAX_PRELUDE_LINES,
        })
    }

    /// Write the [`Id`] to the peer, with its line ending.
    pub async fn to_async_writer(&self, writer: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        writer.write_all(format!("{self}\r\n").as_bytes()).await?;
        writer.flush().await?;

        Ok(())
    }
}

/// Read a single line, capped to [`MAX_LINE_LEN`] bytes, without its ending.
async fn read_line(reader: &mut (impl AsyncBufRead + Unpin)) -> Result<String> {
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(Error::Disconnected);
        }

        let (chunk, found) = match buf.iter().position(|byte| *byte == b'\n') {
            Some(pos) => (&buf[..=pos], true),
            None => (buf, false),
        };

        if line.len() + chunk.len() > MAX_LINE_LEN {
            return Err(Error::Overflow {
                what: "bytes in an identification line",
                limit: MAX_LINE_LEN,
            });
        }

        line.extend_from_slice(chunk);
        let consumed = chunk.len();
        reader.consume_unpin(consumed);

        if found {
            break;
        }
    }

    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSH-{}-{}", self.protoversion, self.softwareversion)?;

        if let Some(comments) = &self.comments {
            write!(f, " {comments}")?;
        }

        Ok(())
    }
}

impl FromStr for Id {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let rest = s.strip_prefix("SSH-").ok_or(())?;
        let (protoversion, rest) = rest.split_once('-').ok_or(())?;
        let (softwareversion, comments) = match rest.split_once(' ') {
            Some((softwareversion, comments)) => (softwareversion, Some(comments.into())),
            None => (rest, None),
        };

        if protoversion.is_empty() || softwareversion.is_empty() {
            return Err(());
        }

        Ok(Self {
            protoversion: protoversion.into(),
            softwareversion: softwareversion.into(),
            comments,
        })
    }
}
