//! Sample `--pp` pretty-print hook (§9 "a reasonable substitute... or
//! leave the hook out of the core"): no scripting host is wired in, only
//! this one OBIS-style formatter, rendering content the way a COSEM
//! object identifier's `Display` impl would (`a.b.c.d.e.f`).
//!
//! A BCD tag whose decoded digit string is exactly 12 digits (6 octets,
//! two BCD digits per byte) is rendered the same way: six dot-separated
//! decimal octets.

use ber_core::tag::Class;

/// Render `content` as a dotted-6 OBIS code when it is exactly 6 bytes,
/// otherwise fall back to a plain hex dump.
pub fn obis_pretty_print(_class: Class, _tag: u32, content: &[u8]) -> String {
    if content.len() == 6 {
        return content.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(".");
    }
    content.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_six_byte_content_as_dotted_obis_code() {
        let got = obis_pretty_print(Class::Universal, 4, &[1, 0, 1, 8, 0, 255]);
        assert_eq!(got, "1.0.1.8.0.255");
    }

    #[test]
    fn falls_back_to_hex_for_other_lengths() {
        let got = obis_pretty_print(Class::Universal, 4, &[0xab, 0xcd]);
        assert_eq!(got, "abcd");
    }
}
