//! # OTP Tool
//!
//! Operator CLI for mission codes: issue secrets, print or check the code a
//! partner page should be showing, and watch it roll over.
//!
//! ## Usage
//! ```bash
//! # Fresh 16-symbol secret
//! otp-tool secret
//!
//! # Current code for a secret, as the visitor would type it
//! otp-tool code --secret JBSWY3DPEHPK3PXP --static-code ABC123
//!
//! # Check a submission (exit status 0 on match)
//! otp-tool verify --secret JBSWY3DPEHPK3PXP ABC123-718010 --at 1700000000
//!
//! # Live countdown
//! otp-tool watch --secret JBSWY3DPEHPK3PXP --static-code ABC123
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use questline_common::constants::{
    CODE_SEPARATOR, DEFAULT_DIGITS, DEFAULT_SECRET_LENGTH, DEFAULT_TIME_STEP_SECS, DEFAULT_WINDOW,
};
use questline_common::totp::{self, TotpParams};

/// Questline OTP tool
#[derive(Parser, Debug)]
#[command(name = "otp-tool")]
#[command(author, version, about = "Issue secrets and inspect mission codes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print freshly generated secrets
    Secret {
        /// Base32 symbols per secret
        #[arg(short, long, default_value_t = DEFAULT_SECRET_LENGTH)]
        length: usize,

        /// Number of secrets to print
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Print the code for a secret
    Code {
        #[command(flatten)]
        otp: OtpArgs,

        /// Unix timestamp to compute the code at (default: now)
        #[arg(long)]
        at: Option<i64>,

        /// Static part to prepend (`STATIC-TOTP`)
        #[arg(long)]
        static_code: Option<String>,

        /// Group digits for display (`123 456`)
        #[arg(long)]
        pretty: bool,

        /// Print JSON instead of text
        #[arg(long, conflicts_with = "pretty")]
        json: bool,
    },

    /// Check a code; exit status 0 on match, 1 otherwise
    Verify {
        #[command(flatten)]
        otp: OtpArgs,

        /// TOTP digits, or a full `STATIC-TOTP` code
        code: String,

        /// Adjacent steps accepted on each side
        #[arg(short, long, default_value_t = DEFAULT_WINDOW)]
        window: u32,

        /// Unix timestamp to validate at (default: now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Show the live code with a countdown until it rolls over
    Watch {
        #[command(flatten)]
        otp: OtpArgs,

        /// Static part to prepend (`STATIC-TOTP`)
        #[arg(long)]
        static_code: Option<String>,
    },
}

/// Secret and code shape shared by every code command
#[derive(Args, Debug)]
struct OtpArgs {
    /// Base32 secret
    #[arg(short, long, env = "OTP_SECRET", hide_env_values = true)]
    secret: String,

    /// Step length in seconds
    #[arg(long, default_value_t = DEFAULT_TIME_STEP_SECS)]
    step: u64,

    /// Code length
    #[arg(long, default_value_t = DEFAULT_DIGITS)]
    digits: u32,
}

impl OtpArgs {
    fn params(&self, window: u32) -> TotpParams {
        TotpParams {
            time_step: self.step,
            digits: self.digits,
            window,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Secret { length, count } => {
            if length < DEFAULT_SECRET_LENGTH {
                bail!("secret length must be at least {} symbols", DEFAULT_SECRET_LENGTH);
            }
            for _ in 0..count {
                println!("{}", totp::generate_secret(length).as_str());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Code {
            otp,
            at,
            static_code,
            pretty,
            json,
        } => {
            let now = at.unwrap_or_else(now);
            let current = otp.params(0).current_at(&otp.secret, now)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&current)?);
            } else {
                println!("{}", render_code(&current.code, static_code.as_deref(), pretty));
                println!("Expires in {}s (at {})", current.seconds_remaining, current.expires_at);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify {
            otp,
            code,
            window,
            at,
        } => {
            let now = at.unwrap_or_else(now);
            let params = otp.params(window);

            if params.try_validate_at(&otp.secret, totp_part(&code), now)? {
                println!("Valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Invalid");
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Watch { otp, static_code } => {
            watch(&otp, static_code.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Redraw the countdown every second until interrupted
fn watch(otp: &OtpArgs, static_code: Option<&str>) -> Result<()> {
    let params = otp.params(0);
    // Fail fast on a bad secret before drawing anything
    let mut current = params.current_at(&otp.secret, now())?;

    let pb = ProgressBar::new(params.time_step);
    pb.set_style(countdown_style());

    loop {
        pb.set_message(render_code(&current.code, static_code, true));
        pb.set_position(current.seconds_remaining);

        std::thread::sleep(Duration::from_secs(1));

        let next = params.current_at(&otp.secret, now())?;
        if next.expires_at != current.expires_at {
            pb.println(format!("Rolled over: {}", render_code(&next.code, static_code, false)));
        }
        current = next;
    }
}

fn countdown_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg}  [{bar:40.cyan/blue}] {pos:>4}s left")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Format a code for display, optionally prefixed by its static part
fn render_code(code: &str, static_code: Option<&str>, pretty: bool) -> String {
    let code = if pretty {
        totp::format_grouped(code)
    } else {
        code.to_string()
    };

    match static_code.map(str::trim).filter(|s| !s.is_empty()) {
        Some(prefix) => format!("{}{}{}", prefix.to_uppercase(), CODE_SEPARATOR, code),
        None => code,
    }
}

/// The TOTP digits of a submission that may carry a static part
fn totp_part(submission: &str) -> &str {
    submission
        .rsplit_once(CODE_SEPARATOR)
        .map_or(submission, |(_, digits)| digits)
        .trim()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    #[test]
    fn test_render_code() {
        assert_eq!(render_code("718010", None, false), "718010");
        assert_eq!(render_code("718010", None, true), "718 010");
        assert_eq!(render_code("718010", Some("abc123"), false), "ABC123-718010");
        assert_eq!(render_code("718010", Some("  "), false), "718010");
    }

    #[test]
    fn test_totp_part() {
        assert_eq!(totp_part("718010"), "718010");
        assert_eq!(totp_part("ABC123-718010"), "718010");
        assert_eq!(totp_part(" ABC123 - 718010 "), "718010");
    }

    #[test]
    fn test_code_command_parses() {
        let cli = Cli::try_parse_from([
            "otp-tool", "code", "--secret", SECRET, "--at", "1700000000", "--pretty",
        ])
        .unwrap();

        match cli.command {
            Command::Code { otp, at, pretty, .. } => {
                assert_eq!(at, Some(1_700_000_000));
                assert!(pretty);
                assert_eq!(otp.step, DEFAULT_TIME_STEP_SECS);
                let current = otp.params(0).current_at(&otp.secret, 1_700_000_000).unwrap();
                assert_eq!(current.code, "718010");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verify_command_defaults() {
        let cli =
            Cli::try_parse_from(["otp-tool", "verify", "--secret", SECRET, "ABC123-718010"])
                .unwrap();

        match cli.command {
            Command::Verify { otp, code, window, at } => {
                assert_eq!(window, DEFAULT_WINDOW);
                assert!(at.is_none());
                let params = otp.params(window);
                assert!(params.validate_at(&otp.secret, totp_part(&code), 1_700_000_000));
                assert!(params.validate_at(&otp.secret, totp_part(&code), 1_700_000_900));
                assert!(!params.validate_at(&otp.secret, totp_part(&code), 1_700_001_800));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_json_conflicts_with_pretty() {
        let parsed = Cli::try_parse_from([
            "otp-tool", "code", "--secret", SECRET, "--pretty", "--json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_countdown_style_template_is_valid() {
        assert!(
            ProgressStyle::default_bar()
                .template("{msg}  [{bar:40.cyan/blue}] {pos:>4}s left")
                .is_ok()
        );
        let _ = countdown_style();
    }
}
