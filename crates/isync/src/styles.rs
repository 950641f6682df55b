//! Terminal color detection and semantic styling for `isync` CLI output.
//!
//! A handful of semantic colors the sync CLI actually needs: a stage is
//! either still in flight (accent), succeeded (pass), or failed (fail).

use owo_colors::OwoColorize;

const PASS: (u8, u8, u8) = (0xc2, 0xd9, 0x4c); // bright green
const FAIL: (u8, u8, u8) = (0xf0, 0x71, 0x78); // bright red
const MUTED: (u8, u8, u8) = (0x6c, 0x76, 0x80); // muted gray
const ACCENT: (u8, u8, u8) = (0x59, 0xc2, 0xff); // bright blue

/// Whether ANSI color codes should be emitted, following the `NO_COLOR`
/// convention (<https://no-color.org/>) plus the usual `CLICOLOR*` escape
/// hatches, falling back to TTY detection.
pub fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("CLICOLOR").as_deref() == Ok("0") {
        return false;
    }
    if std::env::var("TERM").as_deref() == Ok("dumb") {
        return false;
    }
    if std::env::var_os("CLICOLOR_FORCE").is_some() {
        return true;
    }
    crossterm::tty::IsTty::is_tty(&std::io::stderr())
}

fn color_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        s.to_owned()
    }
}

pub fn render_pass(s: &str) -> String {
    color_str(s, PASS)
}

pub fn render_fail(s: &str) -> String {
    color_str(s, FAIL)
}

pub fn render_muted(s: &str) -> String {
    color_str(s, MUTED)
}

pub fn render_accent(s: &str) -> String {
    color_str(s, ACCENT)
}
