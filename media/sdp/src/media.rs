use crate::not_whitespace;
use nom::IResult;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{digit1, space1};
use nom::combinator::{map, map_res, opt, rest};
use nom::multi::many0;
use nom::sequence::{preceded, terminated, tuple};
use std::fmt;
use std::str::FromStr;

/// The two media kinds a session may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// The single codec used for this media kind
    pub fn codec(self) -> Codec {
        match self {
            MediaType::Audio => Codec::PCMU,
            MediaType::Video => Codec::JPEG,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => f.write_str("audio"),
            MediaType::Video => f.write_str("video"),
        }
    }
}

/// Fixed payload description used when building a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    pub payload: u8,
    pub encoding: &'static str,
    pub clock_rate: u32,
}

impl Codec {
    /// G.711 μ-law, 8 kHz
    pub const PCMU: Codec = Codec {
        payload: 0,
        encoding: "PCMU",
        clock_rate: 8000,
    };

    /// JPEG images
    pub const JPEG: Codec = Codec {
        payload: 26,
        encoding: "JPEG",
        clock_rate: 90000,
    };
}

/// Rtpmap attribute (`a=rtpmap:`) as received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload: u8,
    pub encoding: String,
    pub clock_rate: u32,
}

impl RtpMap {
    pub(crate) fn parse(i: &str) -> IResult<&str, Self> {
        map(
            tuple((
                map_res(digit1, u8::from_str),
                preceded(space1, terminated(take_while1(|c| c != '/'), tag("/"))),
                map_res(digit1, u32::from_str),
                // channels or other encoding parameters
                opt(preceded(tag("/"), rest)),
            )),
            |(payload, encoding, clock_rate, _params): (u8, &str, u32, _)| RtpMap {
                payload,
                encoding: encoding.trim().to_owned(),
                clock_rate,
            },
        )(i)
    }
}

impl From<Codec> for RtpMap {
    fn from(codec: Codec) -> Self {
        RtpMap {
            payload: codec.payload,
            encoding: codec.encoding.into(),
            clock_rate: codec.clock_rate,
        }
    }
}

impl fmt::Display for RtpMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.payload, self.encoding, self.clock_rate)
    }
}

/// Media field (`m=`) together with its rtpmap attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLine {
    pub media_type: MediaType,
    pub port: u16,
    pub payloads: Vec<u8>,
    pub rtpmap: Vec<RtpMap>,
}

impl MediaLine {
    /// Media line announcing the fixed codec of `media_type` on `port`
    pub fn local(media_type: MediaType, port: u16) -> Self {
        let codec = media_type.codec();

        MediaLine {
            media_type,
            port,
            payloads: vec![codec.payload],
            rtpmap: vec![codec.into()],
        }
    }

    /// Parses the value of a `m=` line.
    ///
    /// Returns `Ok(None)` for syntactically valid lines of media kinds other than audio or video.
    pub(crate) fn parse(i: &str) -> IResult<&str, Option<Self>> {
        let (i, media_type) = take_while1(not_whitespace)(i)?;
        let (i, port) = preceded(space1, map_res(digit1, u16::from_str))(i)?;
        // port count, irrelevant for a single stream
        let (i, _) = opt(preceded(tag("/"), digit1))(i)?;
        let (i, _proto) = preceded(space1, take_while1(not_whitespace))(i)?;
        let (i, payloads) = many0(preceded(space1, map_res(digit1, u8::from_str)))(i)?;

        let line = MediaType::from_token(media_type).map(|media_type| MediaLine {
            media_type,
            port,
            payloads,
            rtpmap: vec![],
        });

        Ok((i, line))
    }

    /// Returns the rtpmap of the first announced payload, if any was described
    pub fn codec(&self) -> Option<&RtpMap> {
        let first = self.payloads.first()?;

        self.rtpmap.iter().find(|rtpmap| rtpmap.payload == *first)
    }
}

impl fmt::Display for MediaLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={} {} RTP/AVP", self.media_type, self.port)?;

        for payload in &self.payloads {
            write!(f, " {payload}")?;
        }

        f.write_str("\r\n")?;

        for rtpmap in &self.rtpmap {
            write!(f, "a=rtpmap:{rtpmap}\r\n")?;
        }

        Ok(())
    }
}
