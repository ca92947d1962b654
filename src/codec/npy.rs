//! NPY raw tensor format (versions 1.0, 2.0 and 3.0).
//!
//! Layout: `\x93NUMPY`, major, minor, header length (u16 for v1, u32
//! otherwise), then an ASCII dict literal padded with spaces to a 64-byte
//! boundary and terminated by `\n`, then the raw values.
//!
//! Decoding accepts little-endian `f8`, `f4`, `i8` and `i4` in either C or
//! Fortran order. Encoding always writes v1.0, `<f8`, C order.

use std::sync::OnceLock;

use regex_lite::Regex;

use super::CodecError;
use crate::types::Tensor;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGNMENT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F8,
    F4,
    I8,
    I4,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, CodecError> {
        match descr {
            "<f8" => Ok(Self::F8),
            "<f4" => Ok(Self::F4),
            "<i8" => Ok(Self::I8),
            "<i4" => Ok(Self::I4),
            other => Err(CodecError::UnsupportedDtype(other.to_string())),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::F8 | Self::I8 => 8,
            Self::F4 | Self::I4 => 4,
        }
    }

    fn read(self, bytes: &[u8]) -> f64 {
        match self {
            Self::F8 => f64::from_le_bytes(le_array(bytes)),
            Self::F4 => f64::from(f32::from_le_bytes(le_array(bytes))),
            Self::I8 => i64::from_le_bytes(le_array(bytes)) as f64,
            Self::I4 => f64::from(i32::from_le_bytes(le_array(bytes))),
        }
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[derive(Debug, PartialEq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn descr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'descr'\s*:\s*'([^']+)'").expect("static pattern"))
}

fn fortran_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'fortran_order'\s*:\s*(True|False)").expect("static pattern"))
}

fn shape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").expect("static pattern"))
}

fn parse_header(text: &str) -> Result<Header, CodecError> {
    let malformed = |what: &str| CodecError::MalformedHeader(format!("missing {what}"));

    let descr = descr_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| malformed("descr"))?;
    let fortran = fortran_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| malformed("fortran_order"))?;
    let shape = shape_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| malformed("shape"))?;

    let shape = shape
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| CodecError::MalformedHeader(format!("bad dimension '{s}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        dtype: Dtype::parse(descr.as_str())?,
        fortran_order: fortran.as_str() == "True",
        shape,
    })
}

/// Decode an NPY byte buffer.
pub fn decode(bytes: &[u8]) -> Result<Tensor, CodecError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(CodecError::Truncated);
            }
            (u32::from_le_bytes(le_array(&bytes[8..12])) as usize, 12)
        }
        v => return Err(CodecError::UnsupportedVersion(v)),
    };

    let data_start = header_start + header_len;
    let header_bytes = bytes.get(header_start..data_start).ok_or(CodecError::Truncated)?;
    let text = std::str::from_utf8(header_bytes)
        .map_err(|_| CodecError::MalformedHeader("header is not UTF-8".to_string()))?;
    let header = parse_header(text)?;

    let size = header.dtype.size();
    let payload_len = header
        .shape
        .iter()
        .try_fold(size, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| CodecError::MalformedHeader("shape overflows".to_string()))?;
    let data_end = data_start
        .checked_add(payload_len)
        .ok_or_else(|| CodecError::MalformedHeader("payload length overflows".to_string()))?;
    let payload = bytes.get(data_start..data_end).ok_or(CodecError::Truncated)?;

    let values: Vec<f64> = payload.chunks_exact(size).map(|b| header.dtype.read(b)).collect();
    let tensor = if header.fortran_order {
        Tensor::from_fortran(header.shape, values)?
    } else {
        Tensor::new(header.shape, values)?
    };
    Ok(tensor)
}

/// Encode a tensor as NPY v1.0, `<f8`, C order.
pub fn encode(tensor: &Tensor) -> Vec<u8> {
    let shape = match tensor.shape() {
        [single] => format!("({single},)"),
        dims => format!(
            "({})",
            dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape}, }}");

    // magic(6) + version(2) + length(2) + header + '\n' is a multiple of 64
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + tensor.array().len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in tensor.array().iter() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_npy(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut h = header.to_string();
        let unpadded = 10 + h.len() + 1;
        h.push_str(&" ".repeat((64 - unpadded % 64) % 64));
        h.push('\n');
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(h.len() as u16).to_le_bytes());
        out.extend_from_slice(h.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn values(tensor: &Tensor) -> Vec<f64> {
        tensor.array().iter().copied().collect()
    }

    #[test]
    fn test_encoded_header_is_aligned() {
        let tensor = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let bytes = encode(&tensor);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(decode(&bytes).unwrap(), tensor);
    }

    #[test]
    fn test_decode_f4_payload() {
        let payload: Vec<u8> = [1.5f32, -2.0, 0.25, 8.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = raw_npy("{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2), }", &payload);
        let tensor = decode(&bytes).unwrap();
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(values(&tensor), vec![1.5, -2.0, 0.25, 8.0]);
    }

    #[test]
    fn test_decode_fortran_order() {
        // Column-major [[1, 2, 3], [4, 5, 6]]
        let payload: Vec<u8> = [1i64, 4, 2, 5, 3, 6]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = raw_npy("{'descr': '<i8', 'fortran_order': True, 'shape': (2, 3), }", &payload);
        let tensor = decode(&bytes).unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(values(&tensor), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_one_dimensional_shape() {
        let tensor = Tensor::new(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let decoded = decode(&encode(&tensor)).unwrap();
        assert_eq!(decoded.shape(), &[3]);
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(matches!(decode(b"PK\x03\x04 not npy"), Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = raw_npy("{'descr': '<f8', 'fortran_order': False, 'shape': (4, 4), }", &[0u8; 16]);
        assert!(matches!(decode(&bytes), Err(CodecError::Truncated)));
    }

    #[test]
    fn test_rejects_big_endian() {
        let bytes = raw_npy("{'descr': '>f8', 'fortran_order': False, 'shape': (1,), }", &[0u8; 8]);
        assert!(matches!(decode(&bytes), Err(CodecError::UnsupportedDtype(d)) if d == ">f8"));
    }

    #[test]
    fn test_rejects_shape_that_overflows_payload_end() {
        // 2^62 - 1 elements of 4 bytes fit in usize, the end offset does not
        let bytes = raw_npy(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (4611686018427387903,), }",
            &[0u8; 16],
        );
        assert!(matches!(decode(&bytes), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn test_rejects_shape_product_overflow() {
        let bytes = raw_npy(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (4294967296, 4294967296), }",
            &[0u8; 16],
        );
        assert!(matches!(decode(&bytes), Err(CodecError::MalformedHeader(_))));
    }
}
