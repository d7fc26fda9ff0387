//! Key names to Linux input event codes
//!
//! See /usr/include/linux/input-event-codes.h. X11 keycodes are these values
//! plus 8.

use crate::core::error::{Error, Result};

/// Resolve a human-readable key name (case-insensitive) or a raw numeric code
pub fn key_code(key: &str) -> Result<u16> {
    let name = key.trim().to_lowercase();
    let code = match name.as_str() {
        // Special keys
        "return" | "enter" => 28,
        "escape" | "esc" => 1,
        "tab" => 15,
        "backspace" => 14,
        "space" => 57,
        "delete" | "del" => 111,
        "insert" => 110,
        "home" => 102,
        "end" => 107,
        "pageup" => 104,
        "pagedown" => 109,
        "capslock" => 58,
        "minus" | "-" => 12,
        "equal" | "=" => 13,
        "grave" | "`" => 41,

        // Modifiers
        "ctrl" | "control" | "leftctrl" => 29,
        "rightctrl" => 97,
        "alt" | "leftalt" => 56,
        "rightalt" | "altgr" => 100,
        "shift" | "leftshift" => 42,
        "rightshift" => 54,
        "super" | "meta" | "win" => 125,

        // Arrow keys
        "up" => 103,
        "down" => 108,
        "left" => 105,
        "right" => 106,

        // Function keys
        "f1" => 59,
        "f2" => 60,
        "f3" => 61,
        "f4" => 62,
        "f5" => 63,
        "f6" => 64,
        "f7" => 65,
        "f8" => 66,
        "f9" => 67,
        "f10" => 68,
        "f11" => 87,
        "f12" => 88,

        // Letters
        "a" => 30,
        "b" => 48,
        "c" => 46,
        "d" => 32,
        "e" => 18,
        "f" => 33,
        "g" => 34,
        "h" => 35,
        "i" => 23,
        "j" => 36,
        "k" => 37,
        "l" => 38,
        "m" => 50,
        "n" => 49,
        "o" => 24,
        "p" => 25,
        "q" => 16,
        "r" => 19,
        "s" => 31,
        "t" => 20,
        "u" => 22,
        "v" => 47,
        "w" => 17,
        "x" => 45,
        "y" => 21,
        "z" => 44,

        // Digits
        "1" => 2,
        "2" => 3,
        "3" => 4,
        "4" => 5,
        "5" => 6,
        "6" => 7,
        "7" => 8,
        "8" => 9,
        "9" => 10,
        "0" => 11,

        // Raw code, e.g. "code:183" for F13
        other => {
            return other
                .strip_prefix("code:")
                .and_then(|raw| raw.parse::<u16>().ok())
                .filter(|&code| code > 0 && code < 248)
                .ok_or_else(|| Error::dispatch(format!("key '{}'", key), "unknown key name"));
        }
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_names_case_insensitively() {
        assert_eq!(key_code("Enter").unwrap(), 28);
        assert_eq!(key_code("ESC").unwrap(), 1);
        assert_eq!(key_code("w").unwrap(), 17);
        assert_eq!(key_code("F12").unwrap(), 88);
        assert_eq!(key_code("1").unwrap(), 2);
        assert_eq!(key_code("ctrl").unwrap(), 29);
    }

    #[test]
    fn accepts_raw_codes() {
        assert_eq!(key_code("code:183").unwrap(), 183);
        assert!(key_code("code:0").is_err());
        assert!(key_code("code:999").is_err());
    }

    #[test]
    fn unknown_key_is_dispatch_error() {
        let err = key_code("hyperdrive").unwrap_err();
        assert!(matches!(err, Error::InputDispatch { .. }));
    }
}
