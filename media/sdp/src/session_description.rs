use crate::parser::Parser;
use crate::{MediaLine, MediaType};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session description announcing where a user agent receives audio and (optionally) video.
///
/// Built locally from the local address and media ports and printed using its
/// [`Display`](fmt::Display) implementation, or parsed from a remote offer/answer
/// using [`SessionDescription::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Session id of the origin field (`o=`)
    pub session_id: u64,

    /// Connection address (`c=`), `None` if missing or not an IPv4 address
    pub connection: Option<Ipv4Addr>,

    /// Audio media line, `None` if missing, malformed or disabled
    pub audio: Option<MediaLine>,

    /// Video media line, `None` if missing, malformed or disabled
    pub video: Option<MediaLine>,
}

impl SessionDescription {
    /// Create a local session description.
    ///
    /// The audio line is always present, the video line only if `video_port` is `Some` and not `0`.
    pub fn new(local_ip: Ipv4Addr, audio_port: u16, video_port: Option<u16>) -> Self {
        let session_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            session_id,
            connection: Some(local_ip),
            audio: Some(MediaLine::local(MediaType::Audio, audio_port)),
            video: video_port
                .filter(|port| *port != 0)
                .map(|port| MediaLine::local(MediaType::Video, port)),
        }
    }

    /// Parse a session description received from the peer.
    ///
    /// Accepts both `\r\n` and `\n` line endings. Never fails, see the crate level docs.
    pub fn parse(text: &str) -> Self {
        let mut parser = Parser::default();

        for line in text.lines() {
            parser.parse_line(line.trim());
        }

        parser.finish()
    }

    /// Audio port, `0` if absent
    pub fn audio_port(&self) -> u16 {
        self.audio.as_ref().map(|m| m.port).unwrap_or_default()
    }

    /// Video port, `0` if absent
    pub fn video_port(&self) -> u16 {
        self.video.as_ref().map(|m| m.port).unwrap_or_default()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Address to send audio to, if both connection address and audio port are known
    pub fn audio_endpoint(&self) -> Option<SocketAddr> {
        self.endpoint(self.audio_port())
    }

    /// Address to send video to, if both connection address and video port are known
    pub fn video_endpoint(&self) -> Option<SocketAddr> {
        self.endpoint(self.video_port())
    }

    fn endpoint(&self, port: u16) -> Option<SocketAddr> {
        let ip = self.connection?;

        if port == 0 {
            return None;
        }

        Some(SocketAddrV4::new(ip, port).into())
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = self.connection.unwrap_or(Ipv4Addr::UNSPECIFIED);

        write!(f, "v=0\r\n")?;
        write!(
            f,
            "o=- {id} {id} IN IP4 {ip}\r\n",
            id = self.session_id
        )?;
        write!(f, "s=Talk\r\n")?;
        write!(f, "c=IN IP4 {ip}\r\n")?;
        write!(f, "t=0 0\r\n")?;

        if let Some(audio) = &self.audio {
            write!(f, "{audio}")?;
        }

        if let Some(video) = &self.video {
            write!(f, "{video}")?;
        }

        Ok(())
    }
}
