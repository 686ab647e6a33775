use crate::error::{PipelineError, PipelineResult};

/// 解密数据 (AES-128-CBC, PKCS#7)
pub fn decrypt_data(encrypted_data: &[u8], key: &[u8], iv: &[u8]) -> PipelineResult<Vec<u8>> {
    use aes::cipher::block_padding::Pkcs7;
    use aes::cipher::{BlockDecryptMut, KeyIvInit};
    use cbc::Decryptor;

    let cipher = Decryptor::<aes::Aes128>::new_from_slices(key, iv)
        .map_err(|e| PipelineError::Decryption(format!("bad key/iv length: {}", e)))?;
    let mut buf = encrypted_data.to_vec();
    let decrypted_slice = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| PipelineError::Decryption(format!("unpad error: {}", e)))?;

    Ok(decrypted_slice.to_vec())
}

/// 解析manifest中的十六进制IV（0x前缀已在解析阶段剥离）
pub fn parse_iv(iv_hex: &str) -> PipelineResult<[u8; 16]> {
    let trimmed = iv_hex
        .strip_prefix("0x")
        .or_else(|| iv_hex.strip_prefix("0X"))
        .unwrap_or(iv_hex);
    let mut iv = [0u8; 16];
    hex::decode_to_slice(trimmed, &mut iv)
        .map_err(|e| PipelineError::Decryption(format!("bad IV '{}': {}", iv_hex, e)))?;
    Ok(iv)
}

/// 规范化取回的密钥字节
///
/// The origin returns the raw 16 key bytes; the hex round trip only
/// normalizes the buffer, the effective value stays the raw bytes.
pub fn normalize_key(fetched: &[u8]) -> PipelineResult<Vec<u8>> {
    let key = hex::decode(hex::encode(fetched))
        .map_err(|e| PipelineError::Decryption(format!("key normalization: {}", e)))?;
    if key.len() != 16 {
        return Err(PipelineError::Decryption(format!(
            "key has {} bytes, expected 16",
            key.len()
        )));
    }
    Ok(key)
}
