//! Classifies a decoded RADIUS Accounting-Request into a cache [`Action`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use num_traits::FromPrimitive;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::decoder::{self, AcctStatusType, AttributeType, Code};
use crate::filter::Filter;

enum Verb {
    Store,
    Remove,
}

/// Parses the maximal leading run of ASCII digits in `text` (after
/// skipping leading whitespace) as a `u64`, `stoull`-style: stops at the
/// first non-digit rather than rejecting the whole string. Returns `None`
/// if there is no leading digit, or if the digit run overflows `u64`.
fn leading_u64(text: &str) -> Option<u64> {
    let digits: String = text.trim_start().chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Turns raw UDP payloads into cache [`Action`]s, using a [`Filter`] to
/// suppress mappings for opted-out subscribers.
///
/// Constructing a `Parser` blocks until the filter's initial load
/// completes, so that no packet can be classified against an empty filter
/// before the real one is ready.
pub struct Parser {
    filter: Arc<Filter>,
}

impl Parser {
    pub fn new(filter_path: impl Into<PathBuf>, filter_refresh_interval: Duration) -> Self {
        Self { filter: Filter::new(filter_path, filter_refresh_interval) }
    }

    /// Classifies one packet. `slice` must be the bytes actually received
    /// (`bytes_received` long); anything beyond that is never touched.
    pub fn parse(&self, bytes_received: usize, slice: &[u8]) -> Action {
        let slice = &slice[..bytes_received.min(slice.len())];

        let header = match decoder::header(slice) {
            Ok(header) => header,
            Err(err) => {
                debug!(?err, "header decode failed");
                return Action::DoNothing;
            }
        };

        let declared_length = header.length as usize;
        if header.code != Code::Request as u8
            || declared_length < decoder::HEADER_SIZE
            || declared_length > bytes_received
            || declared_length > 4095
        {
            debug!(code = header.code, length = header.length, "rejecting non-request or malformed packet");
            return Action::DoNothing;
        }

        let packet_end = declared_length;
        let mut cursor = decoder::HEADER_SIZE;

        let mut verb: Option<Verb> = None;
        let mut key: Option<String> = None;
        let mut value: Option<String> = None;

        debug!("start attribute iteration");
        while cursor < packet_end {
            let attr = match decoder::attribute(&slice[cursor..]) {
                Ok(attr) => attr,
                Err(err) => {
                    debug!(?err, "attribute decode failed");
                    return Action::DoNothing;
                }
            };
            if attr.length < 2 {
                debug!(length = attr.length, "malformed attribute, length below header size");
                return Action::DoNothing;
            }

            let value_begin = cursor + decoder::ATTRIBUTE_HEADER_SIZE;
            let declared_value_len = attr.length as usize - decoder::ATTRIBUTE_HEADER_SIZE;

            if attr.kind == AttributeType::AcctStatusType as u8 {
                let raw = match decoder::u32(&slice[value_begin..]) {
                    Ok(raw) => raw,
                    Err(err) => {
                        debug!(?err, "acct-status-type decode failed");
                        return Action::DoNothing;
                    }
                };
                verb = match AcctStatusType::from_u32(raw) {
                    Some(AcctStatusType::Start) | Some(AcctStatusType::Update) => Some(Verb::Store),
                    Some(AcctStatusType::Stop) => Some(Verb::Remove),
                    _ => {
                        info!(raw, "acct-status-type is do-nothing, discarding packet");
                        return Action::DoNothing;
                    }
                };
            } else if attr.kind == AttributeType::FramedIpAddress as u8 {
                match decoder::address(&slice[value_begin..]) {
                    Ok(addr) => key = Some(addr.to_string()),
                    Err(err) => {
                        debug!(?err, "framed-ip-address decode failed");
                        return Action::DoNothing;
                    }
                }
            } else if attr.kind == AttributeType::UserName as u8 {
                match decoder::string(&slice[value_begin..], declared_value_len) {
                    Ok(text) => {
                        match leading_u64(&text) {
                            Some(subscriber) if self.filter.contains(subscriber) => {
                                info!(subscriber, "subscriber opted out, suppressing mapping");
                                return Action::Filter { key, value: text };
                            }
                            Some(_) => {}
                            None => {
                                warn!(user_name = %text, "user-name is not numeric, skipping filter check");
                            }
                        }
                        value = Some(text);
                    }
                    Err(err) => {
                        debug!(?err, "user-name decode failed");
                        return Action::DoNothing;
                    }
                }
            }

            if verb.is_some() && key.is_some() && value.is_some() {
                debug!("got all fields, breaking loop");
                break;
            }
            cursor = value_begin + declared_value_len;
        }

        match (verb, key, value) {
            (Some(Verb::Store), Some(key), Some(value)) => Action::Store { key, value },
            (Some(Verb::Remove), Some(key), Some(value)) => Action::Remove { key, value },
            _ => {
                info!("missing required fields, discarding packet");
                Action::DoNothing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::leading_u64;

    #[test]
    fn leading_u64_stops_at_first_non_digit() {
        assert_eq!(leading_u64("123abc"), Some(123));
    }

    #[test]
    fn leading_u64_skips_leading_whitespace() {
        assert_eq!(leading_u64("  42"), Some(42));
    }

    #[test]
    fn leading_u64_is_none_without_a_leading_digit() {
        assert_eq!(leading_u64("abc123"), None);
        assert_eq!(leading_u64(""), None);
    }

    #[test]
    fn leading_u64_is_none_on_overflow() {
        assert_eq!(leading_u64("99999999999999999999999"), None);
    }
}
