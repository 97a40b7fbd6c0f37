//! Text bodies: `ref=<hash>` forms and `hasRefs` answers.

use cairn_types::Hash;
use url::form_urlencoded;

use crate::endpoint::params;
use crate::error::{ProtocolError, ProtocolResult};

/// Content type of ref forms.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Encode hashes as `ref=<hex>&ref=<hex>...`.
pub fn encode_ref_form<'a>(hashes: impl IntoIterator<Item = &'a Hash>) -> String {
    let mut form = form_urlencoded::Serializer::new(String::new());
    for h in hashes {
        form.append_pair(params::REF, &h.to_string());
    }
    form.finish()
}

/// Decode the `ref` fields of a form body. Other fields are ignored.
pub fn decode_ref_form(body: &[u8]) -> ProtocolResult<Vec<Hash>> {
    form_urlencoded::parse(body)
        .filter(|(k, _)| k == params::REF)
        .map(|(_, v)| Hash::parse(&v).map_err(ProtocolError::from))
        .collect()
}

/// Encode `hasRefs` answers, one `"<hash> <true|false>"` line each.
pub fn encode_has_response(answers: &[(Hash, bool)]) -> String {
    answers
        .iter()
        .map(|(h, present)| format!("{h} {present}\n"))
        .collect()
}

pub fn decode_has_response(body: &str) -> ProtocolResult<Vec<(Hash, bool)>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (hash, present) = line
                .split_once(' ')
                .ok_or_else(|| ProtocolError::MalformedForm(format!("bad line {line:?}")))?;
            let present = match present.trim() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(ProtocolError::MalformedForm(format!(
                        "bad presence {other:?}"
                    )))
                }
            };
            Ok((Hash::parse(hash)?, present))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_form_shape() {
        let a = Hash::of(b"a");
        let b = Hash::of(b"b");
        let form = encode_ref_form([&a, &b]);
        assert_eq!(form, format!("ref={a}&ref={b}"));
        assert_eq!(decode_ref_form(form.as_bytes()).unwrap(), vec![a, b]);
    }

    #[test]
    fn ref_form_ignores_other_fields() {
        let a = Hash::of(b"a");
        let body = format!("access_token=xyz&ref={a}");
        assert_eq!(decode_ref_form(body.as_bytes()).unwrap(), vec![a]);
    }

    #[test]
    fn ref_form_rejects_bad_hash() {
        assert!(decode_ref_form(b"ref=zz").is_err());
    }

    #[test]
    fn has_response_lines() {
        let a = Hash::of(b"a");
        let b = Hash::of(b"b");
        let text = encode_has_response(&[(a, true), (b, false)]);
        assert_eq!(text, format!("{a} true\n{b} false\n"));
        assert_eq!(decode_has_response(&text).unwrap(), vec![(a, true), (b, false)]);
    }

    #[test]
    fn has_response_rejects_bad_presence() {
        let a = Hash::of(b"a");
        assert!(decode_has_response(&format!("{a} maybe\n")).is_err());
    }
}
