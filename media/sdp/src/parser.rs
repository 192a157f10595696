use crate::{MediaLine, MediaType, RtpMap, SessionDescription, not_whitespace};
use nom::IResult;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{digit1, space1};
use nom::combinator::{map, map_res};
use nom::sequence::{preceded, tuple};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Line-by-line parser state
#[derive(Default)]
pub(crate) struct Parser {
    session_id: u64,
    connection: Option<Ipv4Addr>,
    media: Vec<Section>,
}

/// Every m= line opens a section, even ones we don't use,
/// so attributes are never attributed to the wrong media
enum Section {
    Media {
        line: MediaLine,
        connection: Option<Ipv4Addr>,
    },
    Ignored,
}

impl Parser {
    pub(crate) fn parse_line(&mut self, line: &str) {
        let Some(value) = line.get(2..) else {
            return;
        };

        match line.as_bytes() {
            [b'o', b'=', ..] => {
                if let Ok((_, session_id)) = origin_session_id(value) {
                    self.session_id = session_id;
                }
            }
            [b'c', b'=', ..] => {
                let Ok((_, address)) = connection(value) else {
                    log::debug!("ignoring unsupported connection line {line:?}");
                    return;
                };

                match self.media.last_mut() {
                    Some(Section::Media { connection, .. }) => *connection = address,
                    Some(Section::Ignored) => {}
                    None => self.connection = address,
                }
            }
            [b'm', b'=', ..] => match MediaLine::parse(value) {
                Ok((_, Some(line))) => self.media.push(Section::Media {
                    line,
                    connection: None,
                }),
                Ok((_, None)) => self.media.push(Section::Ignored),
                Err(e) => {
                    log::debug!("ignoring malformed media line {line:?}, {e}");
                    self.media.push(Section::Ignored);
                }
            },
            [b'a', b'=', ..] => {
                let Some(value) = value.strip_prefix("rtpmap:") else {
                    return;
                };

                let Some(Section::Media { line, .. }) = self.media.last_mut() else {
                    return;
                };

                if let Ok((_, rtpmap)) = RtpMap::parse(value) {
                    line.rtpmap.push(rtpmap);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn finish(self) -> SessionDescription {
        let mut audio = None;
        let mut video = None;
        let mut media_connection = None;

        for section in self.media {
            let Section::Media { line, connection } = section else {
                continue;
            };

            // port 0 means the stream was rejected or disabled
            if line.port == 0 {
                continue;
            }

            let slot = match line.media_type {
                MediaType::Audio => &mut audio,
                MediaType::Video => &mut video,
            };

            if slot.is_some() {
                continue;
            }

            if line.media_type == MediaType::Audio {
                media_connection = connection;
            }

            *slot = Some(line);
        }

        SessionDescription {
            session_id: self.session_id,
            connection: self.connection.or(media_connection),
            audio,
            video,
        }
    }
}

/// `IN IP4 <address>`, hostnames and IP6 addresses are not supported
fn connection(i: &str) -> IResult<&str, Option<Ipv4Addr>> {
    preceded(
        tuple((tag("IN"), space1, tag("IP4"), space1)),
        map(take_while1(not_whitespace), |address: &str| {
            address.split('/').next().and_then(|ip| ip.parse().ok())
        }),
    )(i)
}

/// `<username> <sess-id> ...`
fn origin_session_id(i: &str) -> IResult<&str, u64> {
    preceded(
        tuple((take_while1(not_whitespace), space1)),
        map_res(digit1, u64::from_str),
    )(i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn connection_ip4() {
        let (rem, address) = connection("IN IP4 192.168.123.222").unwrap();

        assert!(rem.is_empty());
        assert_eq!(address, Some(Ipv4Addr::new(192, 168, 123, 222)));
    }

    #[test]
    fn connection_multicast_ttl() {
        let (_, address) = connection("IN IP4 224.2.36.42/127").unwrap();

        assert_eq!(address, Some(Ipv4Addr::new(224, 2, 36, 42)));
    }

    #[test]
    fn connection_host() {
        let (_, address) = connection("IN IP4 example.com").unwrap();

        assert_eq!(address, None);
    }

    #[test]
    fn connection_ip6() {
        assert!(connection("IN IP6 ::1").is_err());
    }

    #[test]
    fn origin() {
        let (_, session_id) = origin_session_id("- 1700000000 1700000000 IN IP4 10.0.0.1").unwrap();

        assert_eq!(session_id, 1700000000);
    }
}
