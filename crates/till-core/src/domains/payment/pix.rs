//! Static PIX "copia e cola" codes (EMV BR Code).
//!
//! Each field is `ID(2) LEN(2) VALUE`. The code ends with field `63`, a
//! CRC-16/CCITT-FALSE over everything before the checksum digits.

use crate::domain::ProcessingError;

const MERCHANT_NAME: &str = "TILL POS";
const MERCHANT_CITY: &str = "SAO PAULO";

/// Longest key that still fits the two-digit length of the account field.
pub const MAX_PIX_KEY_LEN: usize = 77;

/// Build the code the customer scans to pay `amount` cents to `pix_key`.
///
/// A key longer than [`MAX_PIX_KEY_LEN`] bytes is rejected with
/// `InvalidPixKey`.
pub fn merchant_code(pix_key: &str, amount: u64) -> Result<String, ProcessingError> {
    if pix_key.len() > MAX_PIX_KEY_LEN {
        return Err(ProcessingError::InvalidPixKey);
    }
    let account = [field("00", "br.gov.bcb.pix"), field("01", pix_key)].concat();
    let amount = format!("{}.{:02}", amount / 100, amount % 100);

    let mut code = String::new();
    code.push_str(&field("00", "01"));
    code.push_str(&field("26", &account));
    code.push_str(&field("52", "0000"));
    code.push_str(&field("53", "986"));
    code.push_str(&field("54", &amount));
    code.push_str(&field("58", "BR"));
    code.push_str(&field("59", MERCHANT_NAME));
    code.push_str(&field("60", MERCHANT_CITY));
    code.push_str(&field("62", &field("05", "***")));
    code.push_str("6304");
    let crc = crc16(code.as_bytes());
    code.push_str(&format!("{crc:04X}"));
    Ok(code)
}

/// Every caller passes a value shorter than 100 bytes.
fn field(id: &str, value: &str) -> String {
    format!("{id}{:02}{value}", value.len())
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
