use thiserror::Error;

/// Option kind carried by MF-TCP senders (experimental range, RFC 4727).
pub const MF_OPTION_KIND: u8 = 253;

/// Total on-wire length of the MF option: kind, length, and four data bytes.
pub const MF_OPTION_LEN: u8 = 6;

const TCPOPT_EOL: u8 = 0;
const TCPOPT_NOP: u8 = 1;

// Field offsets from the start of the option.
const OFF_REQUESTED: usize = 2;
const OFF_CURRENT: usize = 3;
const OFF_FEEDBACK: usize = 4;
const OFF_PROP_DELAY: usize = 5;

/// The four data bytes of the MF option.
///
/// `requested` and `current` are sender-reported throughputs, `feedback` is
/// the fair-share rate the scheduler writes back, `prop_delay` is the
/// sender's propagation-delay estimate (read for telemetry only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MfCookie {
    pub requested: u8,
    pub current: u8,
    pub feedback: u8,
    pub prop_delay: u8,
}

impl MfCookie {
    /// Encodes the cookie as a complete 6-byte option.
    pub fn encode(&self) -> [u8; 6] {
        [
            MF_OPTION_KIND,
            MF_OPTION_LEN,
            self.requested,
            self.current,
            self.feedback,
            self.prop_delay,
        ]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MfOptionError {
    #[error("MF option not present in the options area")]
    NotFound,
    #[error("options area truncated mid-option")]
    Truncated,
    #[error("MF option carries unexpected length {0}")]
    BadLength(u8),
}

/// How the MF option is located inside the options area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStrategy {
    /// Walk the options honoring standard kind/length encoding until the MF
    /// kind is found; validates the declared option length.
    GenericScan,
    /// Index straight to a byte offset agreed with the sender. No kind
    /// validation; only the bounds of the options area are checked.
    FixedOffset(usize),
}

/// Read-only scan for the MF option.
pub fn parse(options: &[u8]) -> Result<MfCookie, MfOptionError> {
    let at = locate(options)?;
    Ok(read_cookie(&options[at..]))
}

/// Overwrites the feedback byte in place and returns the option fields as
/// they stand after the rewrite (`requested`, `current` and `prop_delay` are
/// never modified). On any error the options area is left byte-for-byte
/// untouched.
pub fn rewrite_feedback(
    options: &mut [u8],
    strategy: RewriteStrategy,
    new_feedback: u8,
) -> Result<MfCookie, MfOptionError> {
    let at = match strategy {
        RewriteStrategy::GenericScan => locate(options)?,
        RewriteStrategy::FixedOffset(at) => {
            if at + MF_OPTION_LEN as usize > options.len() {
                return Err(MfOptionError::Truncated);
            }
            at
        }
    };
    options[at + OFF_FEEDBACK] = new_feedback;
    Ok(read_cookie(&options[at..]))
}

fn read_cookie(option: &[u8]) -> MfCookie {
    MfCookie {
        requested: option[OFF_REQUESTED],
        current: option[OFF_CURRENT],
        feedback: option[OFF_FEEDBACK],
        prop_delay: option[OFF_PROP_DELAY],
    }
}

fn locate(options: &[u8]) -> Result<usize, MfOptionError> {
    let mut at = 0;
    while at < options.len() {
        match options[at] {
            TCPOPT_EOL => return Err(MfOptionError::NotFound),
            TCPOPT_NOP => at += 1,
            kind => {
                let Some(&len) = options.get(at + 1) else {
                    return Err(MfOptionError::Truncated);
                };
                let opsize = usize::from(len);
                if opsize < 2 {
                    // "silly options"
                    return Err(MfOptionError::Truncated);
                }
                if at + opsize > options.len() {
                    // don't parse partial options
                    return Err(MfOptionError::Truncated);
                }
                if kind == MF_OPTION_KIND {
                    if opsize != MF_OPTION_LEN as usize {
                        return Err(MfOptionError::BadLength(len));
                    }
                    return Ok(at);
                }
                at += opsize;
            }
        }
    }
    Err(MfOptionError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_option() -> [u8; 6] {
        MfCookie {
            requested: 10,
            current: 5,
            feedback: 255,
            prop_delay: 3,
        }
        .encode()
    }

    #[test]
    fn test_rewrite_round_trip() {
        let mut options = sample_option();
        let cookie =
            rewrite_feedback(&mut options, RewriteStrategy::GenericScan, 7).unwrap();

        assert_eq!(cookie.requested, 10);
        assert_eq!(cookie.current, 5);
        assert_eq!(cookie.feedback, 7);
        assert_eq!(cookie.prop_delay, 3);
        assert_eq!(parse(&options).unwrap().feedback, 7);
    }

    #[test]
    fn test_scan_skips_leading_options() {
        // NOP, NOP, then an unrelated 4-byte option, then MF
        let mut options = vec![1, 1, 8, 4, 0xAA, 0xBB];
        options.extend_from_slice(&sample_option());

        let cookie =
            rewrite_feedback(&mut options, RewriteStrategy::GenericScan, 42).unwrap();
        assert_eq!(cookie.feedback, 42);
        assert_eq!(&options[2..6], &[8, 4, 0xAA, 0xBB]);
    }

    #[test]
    fn test_bad_length_leaves_bytes_untouched() {
        let mut options = sample_option();
        options[1] = 5; // wrong declared length
        let before = options;

        let err = rewrite_feedback(&mut options, RewriteStrategy::GenericScan, 7)
            .unwrap_err();
        assert_eq!(err, MfOptionError::BadLength(5));
        assert_eq!(options, before);
    }

    #[test]
    fn test_truncated_option_rejected() {
        let full = sample_option();
        let mut options = full[..4].to_vec(); // cut mid-option
        let err = rewrite_feedback(&mut options, RewriteStrategy::GenericScan, 7)
            .unwrap_err();
        assert_eq!(err, MfOptionError::Truncated);
    }

    #[test]
    fn test_eol_stops_scan() {
        let mut options = vec![0u8; 8]; // EOL padding only
        assert_eq!(
            rewrite_feedback(&mut options, RewriteStrategy::GenericScan, 7),
            Err(MfOptionError::NotFound)
        );
    }

    #[test]
    fn test_fixed_offset_skips_kind_validation() {
        // MF option behind two NOPs, located by convention rather than scan
        let mut options = vec![1u8, 1];
        options.extend_from_slice(&sample_option());

        let cookie =
            rewrite_feedback(&mut options, RewriteStrategy::FixedOffset(2), 9).unwrap();
        assert_eq!(cookie.feedback, 9);
        assert_eq!(options[2 + 4], 9);
    }

    #[test]
    fn test_fixed_offset_bounds_checked() {
        let mut options = sample_option();
        assert_eq!(
            rewrite_feedback(&mut options, RewriteStrategy::FixedOffset(4), 9),
            Err(MfOptionError::Truncated)
        );
    }
}
