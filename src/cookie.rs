//! The Session Decryptor: the cookie-crypto transport layer (§4.2).
//!
//! Two cookie flavors are supported. The legacy "signed, encrypted" flavor
//! wraps an AES-256-CBC ciphertext in an outer `ActiveSupport::MessageVerifier`
//! envelope (base64 message, then `"--"`, then a hex HMAC-SHA1 over that
//! message); the newer "authenticated encrypted" flavor is a flat
//! AES-256-GCM ciphertext/iv/tag triple with no outer HMAC, since GCM
//! authenticates itself. Both derive their AES/HMAC keys from a secret base
//! string and a salt via PBKDF2-HMAC-SHA1, the same way the original
//! framework's `ActiveSupport::KeyGenerator` does.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit as AeadKeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use rand::RngCore;
use sha1::Sha1;

use crate::error::CookieError;

/// Rails 4.0 defaults: 1000 PBKDF2 rounds, 64-byte derived key for the
/// CBC/HMAC path (of which only the first 32 bytes become the AES key).
const PBKDF2_ITERATIONS: u32 = 1000;
const CBC_DERIVED_KEY_LEN: usize = 64;
const AES_KEY_LEN: usize = 32;
const GCM_DERIVED_KEY_LEN: usize = 32;
const CBC_BLOCK_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha1 = Hmac<Sha1>;

fn derive_key(secret_key_base: &[u8], salt: &[u8], output_len: usize) -> Result<Vec<u8>, CookieError> {
    let mut derived = vec![0u8; output_len];
    pbkdf2::pbkdf2_hmac::<Sha1>(secret_key_base, salt, PBKDF2_ITERATIONS, &mut derived);
    Ok(derived)
}

fn hmac_sha1(key: &[u8], message: &[u8]) -> Result<Vec<u8>, CookieError> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| CookieError::CryptoError(format!("invalid HMAC key: {e:?}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verifies `message` against `expected_hex` in constant time (§5, §8.1's
/// HMAC constant-time property): the comparison itself is `hmac::Mac::
/// verify_slice`, which never short-circuits on the first differing byte.
fn verify_hmac_sha1(key: &[u8], message: &[u8], expected_hex: &str) -> Result<(), CookieError> {
    let expected = hex::decode(expected_hex)
        .map_err(|e| CookieError::DecodeError(format!("invalid hex signature: {e}")))?;
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| CookieError::CryptoError(format!("invalid HMAC key: {e:?}")))?;
    mac.update(message);
    mac.verify_slice(&expected)
        .map_err(|_| CookieError::InvalidSignature)
}

fn url_unescape(cookie: &str) -> Result<String, CookieError> {
    percent_decode_str(cookie)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .map_err(|e| CookieError::DecodeError(format!("cookie is not valid UTF-8: {e}")))
}

/// Splits `s` on the literal separator `"--"` into exactly two non-empty
/// segments (§4.2.4: "fail InvalidCookie if either is empty").
fn split_two<'a>(s: &'a str) -> Result<(&'a str, &'a str), CookieError> {
    let mut parts = s.splitn(2, "--");
    let first = parts.next().ok_or(CookieError::InvalidCookie)?;
    let second = parts.next().ok_or(CookieError::InvalidCookie)?;
    if first.is_empty() || second.is_empty() {
        return Err(CookieError::InvalidCookie);
    }
    Ok((first, second))
}

fn base64_decode(segment: &str) -> Result<Vec<u8>, CookieError> {
    BASE64
        .decode(segment)
        .map_err(|e| CookieError::DecodeError(format!("invalid base64 segment: {e}")))
}

/// Decrypts a legacy signed-and-encrypted cookie (§4.2.2, §4.2.4).
///
/// The outer envelope is an `ActiveSupport::MessageVerifier` wrapping the
/// base64 of the inner `"{ciphertext_b64}--{iv_b64}"` string; the HMAC is
/// computed over that *outer base64 message*, not over the decoded
/// ciphertext/IV bytes, which is why the signature must be verified before
/// the outer base64 blob is even decoded.
///
/// The returned bytes retain any PKCS#7 padding (§9's design note): this
/// implementation does not unpad, matching the original framework's own
/// historical behavior for this decode path.
pub fn decrypt_signed(
    cookie: &str,
    secret_key_base: &str,
    salt: &str,
    sign_salt: &str,
) -> Result<Vec<u8>, CookieError> {
    let unescaped = url_unescape(cookie)?;
    let (outer_message, hmac_hex) = split_two(&unescaped)?;

    let sign_key = derive_key(secret_key_base.as_bytes(), sign_salt.as_bytes(), CBC_DERIVED_KEY_LEN)?;
    verify_hmac_sha1(&sign_key, outer_message.as_bytes(), hmac_hex)?;

    let inner = base64_decode(outer_message)?;
    let inner = String::from_utf8(inner)
        .map_err(|e| CookieError::DecodeError(format!("inner message is not valid UTF-8: {e}")))?;
    let (ciphertext_b64, iv_b64) = split_two(&inner)?;
    let ciphertext = base64_decode(ciphertext_b64)?;
    let iv = base64_decode(iv_b64)?;

    let derived = derive_key(secret_key_base.as_bytes(), salt.as_bytes(), CBC_DERIVED_KEY_LEN)?;
    let aes_key = &derived[..AES_KEY_LEN];

    let mut buffer = ciphertext;
    let plaintext = Aes256CbcDec::new_from_slices(aes_key, &iv)
        .map_err(|e| CookieError::CryptoError(format!("invalid key/IV length: {e:?}")))?
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| CookieError::CryptoError(format!("CBC decrypt failed: {e:?}")))?;
    Ok(plaintext.to_vec())
}

/// Decrypts an authenticated-encrypted cookie (§4.2.2). Unlike the legacy
/// path, there is no outer HMAC: the three `"--"`-joined segments are the
/// ciphertext, IV, and GCM tag directly, and AES-256-GCM's own tag check is
/// the sole authentication step.
pub fn decrypt_authenticated(
    cookie: &str,
    secret_key_base: &str,
    auth_salt: &str,
) -> Result<Vec<u8>, CookieError> {
    let unescaped = url_unescape(cookie)?;
    let mut segments = unescaped.splitn(3, "--");
    let ciphertext_b64 = segments.next().ok_or(CookieError::InvalidCookie)?;
    let iv_b64 = segments.next().ok_or(CookieError::InvalidCookie)?;
    let tag_b64 = segments.next().ok_or(CookieError::InvalidCookie)?;
    if ciphertext_b64.is_empty() || iv_b64.is_empty() || tag_b64.is_empty() {
        return Err(CookieError::InvalidCookie);
    }

    let ciphertext = base64_decode(ciphertext_b64)?;
    let iv = base64_decode(iv_b64)?;
    let tag = base64_decode(tag_b64)?;
    if tag.len() != GCM_TAG_LEN {
        return Err(CookieError::InvalidCookie);
    }

    if iv.len() != GCM_NONCE_LEN {
        return Err(CookieError::InvalidCookie);
    }

    let key = derive_key(secret_key_base.as_bytes(), auth_salt.as_bytes(), GCM_DERIVED_KEY_LEN)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CookieError::CryptoError(format!("invalid GCM key length: {e:?}")))?;
    let nonce = Nonce::from_slice(&iv);

    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: &combined, aad: &[] })
        .map_err(|_| CookieError::InvalidSignature)?;
    Ok(plaintext)
}

/// Encrypts and signs `plaintext` into the legacy cookie format (§4.2.4),
/// the inverse of [`decrypt_signed`]. Round-trips through `decrypt_signed`
/// for the same `(secret_key_base, salt, sign_salt)` triple (§8.1's cookie
/// round-trip property), up to the PKCS#7 padding bytes `decrypt_signed`
/// deliberately retains.
pub fn encrypt_signed(
    plaintext: &[u8],
    secret_key_base: &str,
    salt: &str,
    sign_salt: &str,
) -> Result<String, CookieError> {
    let derived = derive_key(secret_key_base.as_bytes(), salt.as_bytes(), CBC_DERIVED_KEY_LEN)?;
    let aes_key = &derived[..AES_KEY_LEN];

    let mut iv = [0u8; CBC_BLOCK_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut buffer = vec![0u8; plaintext.len() + CBC_BLOCK_LEN];
    let ciphertext_len = {
        let buf_head = &mut buffer[..plaintext.len()];
        buf_head.copy_from_slice(plaintext);
        Aes256CbcEnc::new_from_slices(aes_key, &iv)
            .map_err(|e| CookieError::CryptoError(format!("invalid key/IV length: {e:?}")))?
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
            .map_err(|e| CookieError::CryptoError(format!("CBC encrypt failed: {e:?}")))?
            .len()
    };
    buffer.truncate(ciphertext_len);

    let ciphertext_b64 = BASE64.encode(&buffer);
    let iv_b64 = BASE64.encode(iv);
    let inner = format!("{ciphertext_b64}--{iv_b64}");
    let outer_message = BASE64.encode(inner.as_bytes());

    let sign_key = derive_key(secret_key_base.as_bytes(), sign_salt.as_bytes(), CBC_DERIVED_KEY_LEN)?;
    let signature = hmac_sha1(&sign_key, outer_message.as_bytes())?;
    let signature_hex = hex::encode(signature);

    let cookie = format!("{outer_message}--{signature_hex}");
    Ok(utf8_percent_encode(&cookie, NON_ALPHANUMERIC).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_KEY_BASE: &str = "fe98c394d54eeae9edff39c1934b156607e4376188463d397d460eef9585cf15c0dd23f353877552d1c9b0565a03b7fdeadfb33907c6d582eb02319a7409610b";
    const SALT: &str = "encrypted cookie";
    const SIGN_SALT: &str = "signed encrypted cookie";
    const AUTH_SALT: &str = "authenticated encrypted cookie";

    const SIGNED_COOKIE: &str = "RkpiOStFLzExVm42aXZiMFZWaDB3c09rbEE4aTUvcEg5Q1VnaTNDOTBwMTdSUGFsdjZqbWZpQmV3eXhQbEJieE1EYXZCQXNGNFhKREI5aUx0aXVFZE1vaXQzSTdtYzc5S1NmeXBEZG93Mm1PQmQ2RVMvdjRqbTdsTW1qTjcxRTZFSVpCZFBUcTByN0ZYQmhWWVZPVE45RUsyS2NRcEV5QkdsajRUL3FGYjNmdUZrYmZ5TVZxSlpucllOaXlTN0pZZG85eHlMNEN0MVdYayttdE8wNTBTSElDYTRqditGMmpoL09hcDhkTFZ0dngyM244aG53aWNLNWRvVTN3K2dpUWd0eGttRXZUdGx2TGJHS0xlN0hKWFI2aVhuQlE4Y3NvYWx1QTZvcDRkbDJZdjl4NGJ1b1B1WW9QdXdEOVpzcCtBR1BCVDkxZkNSVENJZkVqMkgzR3pxQ1lVVEJmQlBYK0ZIQWJ5WHRpOC84PS0taDluekdrZE1LbzVrZDVlMHFSSzNjdz09--5f676b46cb0671630fd33bfec08b6fbf3f858c6a";

    const AUTHENTICATED_COOKIE: &str = "DGLrs7LlwU4oRSRzusM0J6W6W72WAyykuTBNd50StBTGl90UPpdyrGOuI3TQ%2BpD39De%2Fow9jFRheaRfGp3A0AKUlr5NvPP6b%2BGNz%2BohGps10X%2Bc7yYUUfu7PD1FwfWRSlGa%2FoyD3DpZ2kNmtY0EmhEjUAoWHaCZJc8zYDT2xavxQv8GMJJw4sT8AD0T4beKw5izNjqucBSfW6BnsW6aakGchFXjtaGxJx4%2B6ACpE3FQynrq8t3VmeC8tR3WOguumAessRDcDcsngsJslPidJFbRLHsgK4Q7nJBK65b10Gj%2FEjY%2Bax19xpzPH6dM3XvPwgSMhBcoVIEXvx0OxTjAEOxUQhg%3D%3D--En9m7YLKi2LWTw8A--eOW80foO93q4hBewK1ikFQ%3D%3D";

    #[test]
    fn decrypts_signed_cookie_to_session_json() {
        let plaintext = decrypt_signed(SIGNED_COOKIE, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap();
        let text = String::from_utf8(plaintext).unwrap();
        assert!(text.contains("b85897340bfedc7e03b7e9479c271439"));
    }

    #[test]
    fn decrypts_authenticated_cookie_to_session_json() {
        let plaintext =
            decrypt_authenticated(AUTHENTICATED_COOKIE, SECRET_KEY_BASE, AUTH_SALT).unwrap();
        let text = String::from_utf8(plaintext).unwrap();
        assert!(text.contains("b85897340bfedc7e03b7e9479c271439"));
    }

    #[test]
    fn rejects_tampered_signature() {
        let mut tampered = SIGNED_COOKIE.to_string();
        tampered.push('0');
        let err = decrypt_signed(&tampered, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap_err();
        assert!(matches!(err, CookieError::InvalidSignature));
    }

    #[test]
    fn rejects_wrong_sign_salt() {
        let err = decrypt_signed(SIGNED_COOKIE, SECRET_KEY_BASE, SALT, "wrong signature salt")
            .unwrap_err();
        assert!(matches!(err, CookieError::InvalidSignature));
    }

    #[test]
    fn rejects_tampered_gcm_tag() {
        let mut tampered = AUTHENTICATED_COOKIE.to_string();
        tampered.push('A');
        let err = decrypt_authenticated(&tampered, SECRET_KEY_BASE, AUTH_SALT).unwrap_err();
        assert!(matches!(
            err,
            CookieError::InvalidSignature | CookieError::InvalidCookie | CookieError::DecodeError(_)
        ));
    }

    #[test]
    fn encrypt_signed_round_trips_through_decrypt_signed() {
        let plaintext = b"{\"session_id\":\"abc123\"}";
        let cookie = encrypt_signed(plaintext, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap();
        let decrypted = decrypt_signed(&cookie, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap();
        // decrypt_signed retains PKCS#7 padding; strip it for comparison.
        let pad_len = *decrypted.last().unwrap() as usize;
        assert_eq!(&decrypted[..decrypted.len() - pad_len], plaintext);
    }

    #[test]
    fn rejects_cookie_missing_separator() {
        let err = decrypt_signed("not-a-real-cookie", SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap_err();
        assert!(matches!(err, CookieError::InvalidCookie));
    }
}
