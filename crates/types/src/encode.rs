//! Memcomparable encoding: a typed, self-delimiting byte form whose
//! lexicographic order matches the value order within a type. Ordered
//! indexes compare nothing but these bytes.

use crate::Value;

const NULL_TAG: u8 = 0x00;
const INT64_TAG: u8 = 0x01;
const DOUBLE_TAG: u8 = 0x02;
const VARCHAR_TAG: u8 = 0x03;

const SIGN_BIT: u64 = 1 << 63;

/// Varchar payload group width. Each group is followed by a marker byte:
/// `CONTINUE` when another group follows, otherwise the count of meaningful
/// bytes in the final group.
const GROUP: usize = 8;
const CONTINUE: u8 = 9;

impl Value {
    pub fn encode_memcomparable(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(NULL_TAG),
            Value::Int64(v) => {
                out.push(INT64_TAG);
                out.extend_from_slice(&((*v as u64) ^ SIGN_BIT).to_be_bytes());
            }
            Value::Double(v) => {
                out.push(DOUBLE_TAG);
                let bits = v.to_bits();
                let mapped = if bits & SIGN_BIT != 0 { !bits } else { bits ^ SIGN_BIT };
                out.extend_from_slice(&mapped.to_be_bytes());
            }
            Value::Varchar(s) => {
                out.push(VARCHAR_TAG);
                let bytes = s.as_bytes();
                let mut rest = bytes;
                loop {
                    let take = rest.len().min(GROUP);
                    out.extend_from_slice(&rest[..take]);
                    out.extend(std::iter::repeat(0u8).take(GROUP - take));
                    rest = &rest[take..];
                    if rest.is_empty() {
                        out.push(take as u8);
                        break;
                    }
                    out.push(CONTINUE);
                }
            }
        }
    }

    pub fn to_memcomparable(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_memcomparable(&mut out);
        out
    }

    /// Decode one value from the head of `src`, returning the value and the
    /// number of bytes consumed. `None` on a truncated or unknown encoding.
    pub fn decode_memcomparable(src: &[u8]) -> Option<(Value, usize)> {
        let (&tag, rest) = src.split_first()?;
        match tag {
            NULL_TAG => Some((Value::Null, 1)),
            INT64_TAG => {
                let raw = u64::from_be_bytes(rest.get(..8)?.try_into().ok()?);
                Some((Value::Int64((raw ^ SIGN_BIT) as i64), 9))
            }
            DOUBLE_TAG => {
                let mapped = u64::from_be_bytes(rest.get(..8)?.try_into().ok()?);
                let bits = if mapped & SIGN_BIT != 0 { mapped ^ SIGN_BIT } else { !mapped };
                Some((Value::Double(f64::from_bits(bits)), 9))
            }
            VARCHAR_TAG => {
                let mut bytes = Vec::new();
                let mut consumed = 1;
                let mut rest = rest;
                loop {
                    let group = rest.get(..GROUP + 1)?;
                    consumed += GROUP + 1;
                    let marker = group[GROUP];
                    if marker == CONTINUE {
                        bytes.extend_from_slice(&group[..GROUP]);
                        rest = &rest[GROUP + 1..];
                        continue;
                    }
                    if marker as usize > GROUP {
                        return None;
                    }
                    bytes.extend_from_slice(&group[..marker as usize]);
                    break;
                }
                Some((Value::Varchar(String::from_utf8(bytes).ok()?), consumed))
            }
            _ => None,
        }
    }
}
