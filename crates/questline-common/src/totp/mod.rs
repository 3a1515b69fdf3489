//! Time-based one-time codes for mission verification.
//!
//! HOTP/TOTP per RFC 4226 and RFC 6238 using HMAC-SHA1, with a 15-minute
//! step by default. Everything here is a pure function of its inputs, except
//! `validate` and `current` which read the wall clock. No storage, no I/O.
//!
//! ```text
//! counter = floor(timestamp / time_step)
//! digest  = HMAC-SHA1(base32_decode(secret), counter as u64 big-endian)
//! code    = dynamic_truncate(digest) mod 10^digits, zero-padded
//! ```

pub mod base32;
mod secret;

pub use base32::Base32Error;
pub use secret::{Secret, generate_secret};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::constants::{DEFAULT_DIGITS, DEFAULT_TIME_STEP_SECS, DEFAULT_WINDOW, MAX_DIGITS};

type HmacSha1 = Hmac<Sha1>;

/// Code generation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    /// Stored secret is not valid Base32
    #[error("invalid secret: {0}")]
    InvalidSecret(#[from] Base32Error),

    /// Stored secret decodes to zero bytes
    #[error("invalid secret: decodes to an empty key")]
    EmptySecret,

    #[error("time step must be greater than zero")]
    InvalidTimeStep,

    #[error("digits must be between 1 and 10, got {0}")]
    InvalidDigits(u32),

    #[error("timestamp {0} is before the Unix epoch")]
    NegativeTimestamp(i64),
}

impl OtpError {
    /// True when the stored secret itself is corrupt (operator attention)
    pub fn is_corrupt_secret(&self) -> bool {
        matches!(self, Self::InvalidSecret(_) | Self::EmptySecret)
    }
}

/// The code currently on display and how long it has left
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCode {
    pub code: String,
    /// Seconds until the step boundary, in `1..=time_step`
    pub seconds_remaining: u64,
    /// Unix timestamp of the step boundary
    pub expires_at: i64,
}

/// Tunable parameters shared by generation, validation, and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpParams {
    /// Step length in seconds
    pub time_step: u64,
    /// Code length
    pub digits: u32,
    /// Adjacent steps accepted on each side of the current one
    pub window: u32,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            time_step: DEFAULT_TIME_STEP_SECS,
            digits: DEFAULT_DIGITS,
            window: DEFAULT_WINDOW,
        }
    }
}

impl TotpParams {
    pub fn generate(&self, secret: &str, timestamp: i64) -> Result<String, OtpError> {
        generate_with_digits(secret, timestamp, self.time_step, self.digits)
    }

    /// Validate against the configured window at `now`.
    ///
    /// `Err` only when no offset in the window could be computed at all,
    /// which in practice means the secret is corrupt.
    pub fn try_validate_at(
        &self,
        secret: &str,
        submitted: &str,
        now: i64,
    ) -> Result<bool, OtpError> {
        try_validate_with(secret, submitted, now, self.window, self.time_step, self.digits)
    }

    pub fn validate_at(&self, secret: &str, submitted: &str, now: i64) -> bool {
        self.try_validate_at(secret, submitted, now).unwrap_or(false)
    }

    pub fn current_at(&self, secret: &str, now: i64) -> Result<CurrentCode, OtpError> {
        current_with(secret, now, self.time_step, self.digits)
    }

    /// Wall-clock span over which one code is accepted
    pub fn acceptance_span_secs(&self) -> u64 {
        (2 * u64::from(self.window) + 1).saturating_mul(self.time_step)
    }
}

/// Compute the code for `secret` at `timestamp` with `DEFAULT_DIGITS` digits.
pub fn generate(secret: &str, timestamp: i64, time_step: u64) -> Result<String, OtpError> {
    generate_with_digits(secret, timestamp, time_step, DEFAULT_DIGITS)
}

/// Compute the `digits`-long code for `secret` at `timestamp`.
pub fn generate_with_digits(
    secret: &str,
    timestamp: i64,
    time_step: u64,
    digits: u32,
) -> Result<String, OtpError> {
    if time_step == 0 {
        return Err(OtpError::InvalidTimeStep);
    }
    if digits == 0 || digits > MAX_DIGITS {
        return Err(OtpError::InvalidDigits(digits));
    }
    if timestamp < 0 {
        return Err(OtpError::NegativeTimestamp(timestamp));
    }

    let key = base32::decode(secret)?;
    if key.is_empty() {
        return Err(OtpError::EmptySecret);
    }

    let counter = timestamp as u64 / time_step;
    Ok(hotp(&key, counter, digits))
}

/// RFC 4226 HOTP over raw key bytes.
fn hotp(key: &[u8], counter: u64, digits: u32) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[19] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let otp = u64::from(binary) % 10u64.pow(digits);
    format!("{:0width$}", otp, width = digits as usize)
}

/// Validate a submitted code at the current wall-clock time.
pub fn validate(secret: &str, submitted: &str, window: u32, time_step: u64) -> bool {
    validate_at(secret, submitted, chrono::Utc::now().timestamp(), window, time_step)
}

/// Validate a submitted code as if the clock read `now`.
pub fn validate_at(secret: &str, submitted: &str, now: i64, window: u32, time_step: u64) -> bool {
    try_validate_with(secret, submitted, now, window, time_step, DEFAULT_DIGITS).unwrap_or(false)
}

fn try_validate_with(
    secret: &str,
    submitted: &str,
    now: i64,
    window: u32,
    time_step: u64,
    digits: u32,
) -> Result<bool, OtpError> {
    let submitted = submitted.trim();
    if !is_well_formed(submitted, digits) {
        return Ok(false);
    }

    let step = i64::try_from(time_step).map_err(|_| OtpError::InvalidTimeStep)?;
    let window = i64::from(window);

    let mut last_error = None;
    let mut computed_any = false;

    for i in -window..=window {
        let Some(at) = i.checked_mul(step).and_then(|delta| now.checked_add(delta)) else {
            continue;
        };

        match generate_with_digits(secret, at, time_step, digits) {
            Ok(expected) => {
                computed_any = true;
                if bool::from(expected.as_bytes().ct_eq(submitted.as_bytes())) {
                    return Ok(true);
                }
            }
            Err(e) => last_error = Some(e),
        }
    }

    match (computed_any, last_error) {
        (false, Some(e)) => Err(e),
        _ => Ok(false),
    }
}

/// True when `code` is exactly `digits` ASCII digits
pub fn is_well_formed(code: &str, digits: u32) -> bool {
    code.len() == digits as usize && code.bytes().all(|b| b.is_ascii_digit())
}

/// The code for the current wall-clock step.
pub fn current(secret: &str, time_step: u64) -> Result<CurrentCode, OtpError> {
    current_at(secret, chrono::Utc::now().timestamp(), time_step)
}

/// The code for the step containing `now`.
pub fn current_at(secret: &str, now: i64, time_step: u64) -> Result<CurrentCode, OtpError> {
    current_with(secret, now, time_step, DEFAULT_DIGITS)
}

fn current_with(
    secret: &str,
    now: i64,
    time_step: u64,
    digits: u32,
) -> Result<CurrentCode, OtpError> {
    let code = generate_with_digits(secret, now, time_step, digits)?;

    // Non-negative after generate_with_digits
    let now_secs = now as u64;
    let expires_at = (now_secs / time_step)
        .checked_add(1)
        .and_then(|next| next.checked_mul(time_step))
        .ok_or(OtpError::InvalidTimeStep)?;

    Ok(CurrentCode {
        code,
        seconds_remaining: expires_at - now_secs,
        expires_at: i64::try_from(expires_at).map_err(|_| OtpError::InvalidTimeStep)?,
    })
}

/// Seconds left in the step containing `now`
pub fn seconds_remaining_at(now: i64, time_step: u64) -> u64 {
    if time_step == 0 {
        return 0;
    }
    let now = now.max(0) as u64;
    time_step - (now % time_step)
}

/// Split a code into two groups for display (`"123456"` -> `"123 456"`).
pub fn format_grouped(code: &str) -> String {
    match code.len() {
        6 | 8 if code.is_ascii() => {
            let (head, tail) = code.split_at(code.len() / 2);
            format!("{} {}", head, tail)
        }
        _ => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "JBSWY3DPEHPK3PXP";
    /// "12345678901234567890" from the RFC appendices
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_regression_vector() {
        assert_eq!(1_700_000_000 / 900, 1_888_888);
        assert_eq!(generate(SECRET, 1_700_000_000, 900).unwrap(), "718010");
    }

    #[test]
    fn test_rfc4226_hotp_vectors() {
        let expected = [
            "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
            "399871", "520489",
        ];
        for (counter, code) in expected.iter().enumerate() {
            // A one-second step makes the timestamp the HOTP counter
            assert_eq!(generate(RFC_SECRET, counter as i64, 1).unwrap(), *code);
        }
    }

    #[test]
    fn test_rfc6238_sha1_vectors() {
        let vectors = [
            (59, "94287082"),
            (1_111_111_109, "07081804"),
            (1_111_111_111, "14050471"),
            (1_234_567_890, "89005924"),
            (2_000_000_000, "69279037"),
            (20_000_000_000, "65353130"),
        ];
        for (timestamp, code) in vectors {
            assert_eq!(generate_with_digits(RFC_SECRET, timestamp, 30, 8).unwrap(), code);
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate(SECRET, 123_456_789, 900).unwrap();
        let b = generate(SECRET, 123_456_789, 900).unwrap();
        assert_eq!(a, b);

        // Same step, different second
        assert_eq!(generate(SECRET, 900, 900).unwrap(), generate(SECRET, 1799, 900).unwrap());
    }

    #[test]
    fn test_generate_is_zero_padded() {
        // 07081804 has a leading zero
        let code = generate_with_digits(RFC_SECRET, 1_111_111_109, 30, 8).unwrap();
        assert!(code.starts_with('0'));

        for digits in 1..=MAX_DIGITS {
            for ts in [0, 59, 1_700_000_000] {
                let code = generate_with_digits(SECRET, ts, 30, digits).unwrap();
                assert_eq!(code.len(), digits as usize);
                assert!(code.bytes().all(|b| b.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn test_generate_rejects_bad_inputs() {
        assert!(matches!(
            generate("NOT-BASE32!", 0, 900),
            Err(OtpError::InvalidSecret(_))
        ));
        assert_eq!(generate("====", 0, 900), Err(OtpError::EmptySecret));
        assert_eq!(generate(SECRET, 0, 0), Err(OtpError::InvalidTimeStep));
        assert_eq!(generate_with_digits(SECRET, 0, 900, 0), Err(OtpError::InvalidDigits(0)));
        assert_eq!(generate_with_digits(SECRET, 0, 900, 11), Err(OtpError::InvalidDigits(11)));
        assert_eq!(generate(SECRET, -1, 900), Err(OtpError::NegativeTimestamp(-1)));
    }

    #[test]
    fn test_window_boundary() {
        let code = generate(SECRET, 0, 900).unwrap();
        assert_eq!(code, "282760");

        assert!(validate_at(SECRET, &code, 0, 1, 900));
        assert!(validate_at(SECRET, &code, 900, 1, 900));
        assert!(!validate_at(SECRET, &code, 1800, 1, 900));

        // A wider window reaches further
        assert!(validate_at(SECRET, &code, 1800, 2, 900));
        // Window zero accepts only the current step
        assert!(!validate_at(SECRET, &code, 900, 0, 900));
    }

    #[test]
    fn test_future_step_accepted() {
        // Code for step 2 is accepted while the clock is still in step 1
        let code = generate(SECRET, 1800, 900).unwrap();
        assert_eq!(code, "602287");
        assert!(validate_at(SECRET, &code, 900, 1, 900));
        assert!(!validate_at(SECRET, &code, 0, 1, 900));
    }

    #[test]
    fn test_malformed_submissions_skip_crypto() {
        // With a corrupt secret, reaching the crypto path would be an error
        let params = TotpParams::default();
        for bad in ["12a456", "12345", "1234567", "", "12 456", "١٢٣٤٥٦"] {
            assert!(!validate_at("!!corrupt!!", bad, 1_700_000_000, 1, 900));
            assert_eq!(params.try_validate_at("!!corrupt!!", bad, 1_700_000_000), Ok(false));
        }
    }

    #[test]
    fn test_corrupt_secret_surfaces_from_try_validate() {
        let params = TotpParams::default();
        let result = params.try_validate_at("!!corrupt!!", "123456", 1_700_000_000);
        assert!(matches!(result, Err(ref e) if e.is_corrupt_secret()));
        assert!(!params.validate_at("!!corrupt!!", "123456", 1_700_000_000));
    }

    #[test]
    fn test_validate_trims_whitespace() {
        assert!(validate_at(SECRET, " 718010\n", 1_700_000_000, 1, 900));
    }

    #[test]
    fn test_validate_near_epoch_skips_negative_offsets() {
        // now - step is negative; the remaining offsets still count
        let code = generate(SECRET, 0, 900).unwrap();
        let params = TotpParams::default();
        assert_eq!(params.try_validate_at(SECRET, &code, 10), Ok(true));
        assert_eq!(params.try_validate_at(SECRET, "000000", 10), Ok(false));
    }

    #[test]
    fn test_current_at() {
        let current = current_at(SECRET, 1_700_000_000, 900).unwrap();
        assert_eq!(current.code, "718010");
        // Step 1888888 ends at 1888889 * 900 = 1700000100
        assert_eq!(current.expires_at, 1_700_000_100);
        assert_eq!(current.seconds_remaining, 100);

        let at_boundary = current_at(SECRET, 1_700_000_100, 900).unwrap();
        assert_eq!(at_boundary.seconds_remaining, 900);

        let last_second = current_at(SECRET, 1_700_000_099, 900).unwrap();
        assert_eq!(last_second.seconds_remaining, 1);
        assert_eq!(last_second.code, "718010");
    }

    #[test]
    fn test_seconds_remaining_at() {
        assert_eq!(seconds_remaining_at(1_700_000_000, 900), 100);
        assert_eq!(seconds_remaining_at(0, 900), 900);
        assert_eq!(seconds_remaining_at(5, 0), 0);
    }

    #[test]
    fn test_params_round_trip_through_generation() {
        let params = TotpParams {
            time_step: 30,
            digits: 8,
            window: 1,
        };
        let code = params.generate(RFC_SECRET, 59).unwrap();
        assert_eq!(code, "94287082");
        assert!(params.validate_at(RFC_SECRET, &code, 59));
        assert!(params.validate_at(RFC_SECRET, &code, 89));
        assert!(!params.validate_at(RFC_SECRET, &code, 120));
        // Six digits never match an eight digit configuration
        assert!(!params.validate_at(RFC_SECRET, "287082", 59));
    }

    #[test]
    fn test_acceptance_span() {
        assert_eq!(TotpParams::default().acceptance_span_secs(), 2700);

        let huge = TotpParams {
            time_step: u64::MAX,
            ..TotpParams::default()
        };
        assert_eq!(huge.acceptance_span_secs(), u64::MAX);
    }

    #[test]
    fn test_current_at_rejects_steps_past_i64() {
        // The step boundary would not fit in an i64 timestamp
        assert_eq!(
            current_at(SECRET, 1_700_000_000, 10u64.pow(19)),
            Err(OtpError::InvalidTimeStep)
        );
        assert_eq!(current_at(SECRET, 1, u64::MAX), Err(OtpError::InvalidTimeStep));

        // Largest step that still fits
        let step = i64::MAX as u64;
        let current = current_at(SECRET, 1_700_000_000, step).unwrap();
        assert_eq!(current.expires_at, i64::MAX);
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped("123456"), "123 456");
        assert_eq!(format_grouped("12345678"), "1234 5678");
        assert_eq!(format_grouped("12345"), "12345");
    }
}
