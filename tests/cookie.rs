//! Integration tests over the public Session Decryptor surface (§4.2, §8.2
//! scenarios 7 and 8), using the fixed test vectors from
//! `examples/original_source/session/session_test.go`.

use rails_marshal_session::{decrypt_authenticated, decrypt_signed, encrypt_signed, CookieError};

const SECRET_KEY_BASE: &str = "fe98c394d54eeae9edff39c1934b156607e4376188463d397d460eef9585cf15c0dd23f353877552d1c9b0565a03b7fdeadfb33907c6d582eb02319a7409610b";
const SALT: &str = "encrypted cookie";
const SIGN_SALT: &str = "signed encrypted cookie";
const AUTH_SALT: &str = "authenticated encrypted cookie";

const SIGNED_COOKIE: &str = "RkpiOStFLzExVm42aXZiMFZWaDB3c09rbEE4aTUvcEg5Q1VnaTNDOTBwMTdSUGFsdjZqbWZpQmV3eXhQbEJieE1EYXZCQXNGNFhKREI5aUx0aXVFZE1vaXQzSTdtYzc5S1NmeXBEZG93Mm1PQmQ2RVMvdjRqbTdsTW1qTjcxRTZFSVpCZFBUcTByN0ZYQmhWWVZPVE45RUsyS2NRcEV5QkdsajRUL3FGYjNmdUZrYmZ5TVZxSlpucllOaXlTN0pZZG85eHlMNEN0MVdYayttdE8wNTBTSElDYTRqditGMmpoL09hcDhkTFZ0dngyM244aG53aWNLNWRvVTN3K2dpUWd0eGttRXZUdGx2TGJHS0xlN0hKWFI2aVhuQlE4Y3NvYWx1QTZvcDRkbDJZdjl4NGJ1b1B1WW9QdXdEOVpzcCtBR1BCVDkxZkNSVENJZkVqMkgzR3pxQ1lVVEJmQlBYK0ZIQWJ5WHRpOC84PS0taDluekdrZE1LbzVrZDVlMHFSSzNjdz09--5f676b46cb0671630fd33bfec08b6fbf3f858c6a";

const AUTHENTICATED_COOKIE: &str = "DGLrs7LlwU4oRSRzusM0J6W6W72WAyykuTBNd50StBTGl90UPpdyrGOuI3TQ%2BpD39De%2Fow9jFRheaRfGp3A0AKUlr5NvPP6b%2BGNz%2BohGps10X%2Bc7yYUUfu7PD1FwfWRSlGa%2FoyD3DpZ2kNmtY0EmhEjUAoWHaCZJc8zYDT2xavxQv8GMJJw4sT8AD0T4beKw5izNjqucBSfW6BnsW6aakGchFXjtaGxJx4%2B6ACpE3FQynrq8t3VmeC8tR3WOguumAessRDcDcsngsJslPidJFbRLHsgK4Q7nJBK65b10Gj%2FEjY%2Bax19xpzPH6dM3XvPwgSMhBcoVIEXvx0OxTjAEOxUQhg%3D%3D--En9m7YLKi2LWTw8A--eOW80foO93q4hBewK1ikFQ%3D%3D";

#[test]
fn decrypt_signed_yields_the_session_id() {
    let bytes = decrypt_signed(SIGNED_COOKIE, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains(r#""session_id":"b85897340bfedc7e03b7e9479c271439""#));
}

#[test]
fn decrypt_authenticated_yields_the_session_id() {
    let bytes = decrypt_authenticated(AUTHENTICATED_COOKIE, SECRET_KEY_BASE, AUTH_SALT).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains(r#""session_id":"b85897340bfedc7e03b7e9479c271439""#));
}

#[test]
fn tampering_with_the_hmac_segment_is_rejected() {
    // Flip a character inside the hex HMAC suffix.
    let mut tampered = SIGNED_COOKIE.to_string();
    let len = tampered.len();
    tampered.replace_range(len - 1..len, "0");
    let err = decrypt_signed(&tampered, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap_err();
    assert!(matches!(err, CookieError::InvalidSignature));
}

#[test]
fn round_trips_through_encrypt_then_decrypt() {
    let plaintext = br#"{"session_id":"round-trip-test"}"#;
    let cookie = encrypt_signed(plaintext, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap();
    let decrypted = decrypt_signed(&cookie, SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap();
    let pad_len = *decrypted.last().unwrap() as usize;
    assert_eq!(&decrypted[..decrypted.len() - pad_len], &plaintext[..]);
}

#[test]
fn malformed_cookie_without_a_separator_is_invalid() {
    let err = decrypt_signed("no-separator-here", SECRET_KEY_BASE, SALT, SIGN_SALT).unwrap_err();
    assert!(matches!(err, CookieError::InvalidCookie));
}
