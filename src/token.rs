//! Signed event tokens: minted on selection, verified by the event
//! ingestion endpoints.
//!
//! Wire form is deterministic field-order serialisation followed by an
//! HMAC-SHA256 MAC (truncated to 16 bytes) over that serialisation,
//! base64url-encoded without padding so the result is safe to embed in a
//! query string. Verification recomputes the MAC and compares it in
//! constant time via `subtle`, since this is the one place in the system
//! where a timing side-channel would compromise accounting integrity rather
//! than just availability — counters fail open, tokens fail closed.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::TokenError;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_CUSTOM_PARAMS_COUNT: usize = 10;
pub const MAX_CUSTOM_PARAM_KEY_LENGTH: usize = 64;
pub const MAX_CUSTOM_PARAM_VALUE_LENGTH: usize = 256;
pub const MAX_TOKEN_BYTES: usize = 1024;

const MAC_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct EventTokenPayload {
    pub request_id: String,
    pub impression_id: String,
    pub creative_id: String,
    pub campaign_id: String,
    pub line_item_id: String,
    pub user_id: String,
    pub publisher_id: String,
    pub placement_id: String,
    pub price: f64,
    pub currency: String,
    pub custom_params: BTreeMap<String, String>,
    pub issued_at: i64,
}

impl EventTokenPayload {
    fn validate(&self) -> Result<(), TokenError> {
        if self.custom_params.len() > MAX_CUSTOM_PARAMS_COUNT {
            return Err(TokenError::TooManyCustomParams(self.custom_params.len(), MAX_CUSTOM_PARAMS_COUNT));
        }
        for (key, value) in &self.custom_params {
            if key.is_empty() || key.len() > MAX_CUSTOM_PARAM_KEY_LENGTH {
                return Err(TokenError::KeyLength(key.clone()));
            }
            if value.len() > MAX_CUSTOM_PARAM_VALUE_LENGTH {
                return Err(TokenError::ValueLength(key.clone()));
            }
        }
        Ok(())
    }

    /// Deterministic wire encoding: fixed field order, `BTreeMap` keeps
    /// custom params in sorted order, fields separated by `\x1f` (unit
    /// separator) so values containing `&`/`=` never need escaping.
    fn serialise(&self) -> String {
        let mut out = String::new();
        let push = |out: &mut String, field: &str| {
            out.push_str(field);
            out.push('\x1f');
        };
        push(&mut out, &self.request_id);
        push(&mut out, &self.impression_id);
        push(&mut out, &self.creative_id);
        push(&mut out, &self.campaign_id);
        push(&mut out, &self.line_item_id);
        push(&mut out, &self.user_id);
        push(&mut out, &self.publisher_id);
        push(&mut out, &self.placement_id);
        push(&mut out, &self.price.to_bits().to_string());
        push(&mut out, &self.currency);
        push(&mut out, &self.issued_at.to_string());
        for (key, value) in &self.custom_params {
            out.push_str(key);
            out.push('\x1e');
            out.push_str(value);
            out.push('\x1f');
        }
        out
    }
}

pub struct TokenCodec {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenCodec {
    pub fn new(secret: Vec<u8>, ttl_secs: i64) -> Self {
        Self { secret, ttl_secs }
    }

    fn mac_bytes(&self, serialised: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(serialised.as_bytes());
        mac.finalize().into_bytes()[..MAC_LEN].to_vec()
    }

    /// Mints a token for `payload`, stamping `issued_at` to `now`.
    pub fn mint(&self, mut payload: EventTokenPayload, now: i64) -> Result<String, TokenError> {
        payload.issued_at = now;
        payload.validate()?;

        let serialised = payload.serialise();
        let mac = self.mac_bytes(&serialised);

        let body = URL_SAFE_NO_PAD.encode(serialised.as_bytes());
        let mac_b64 = URL_SAFE_NO_PAD.encode(mac);
        let token = format!("{body}.{mac_b64}");

        if token.len() > MAX_TOKEN_BYTES {
            return Err(TokenError::TooLarge(MAX_TOKEN_BYTES));
        }
        Ok(token)
    }

    /// Verifies `token` against `now`, returning the payload on success.
    /// `ttl_secs == 0` disables expiry checking, for tests.
    pub fn verify(&self, token: &str, now: i64) -> Result<EventTokenPayload, TokenError> {
        let (body_b64, mac_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let serialised_bytes = URL_SAFE_NO_PAD.decode(body_b64).map_err(|_| TokenError::Malformed)?;
        let serialised = String::from_utf8(serialised_bytes).map_err(|_| TokenError::Malformed)?;
        let given_mac = URL_SAFE_NO_PAD.decode(mac_b64).map_err(|_| TokenError::Malformed)?;

        let expected_mac = self.mac_bytes(&serialised);
        if expected_mac.ct_eq(&given_mac).unwrap_u8() != 1 {
            return Err(TokenError::BadMac);
        }

        let payload = parse_payload(&serialised)?;

        if self.ttl_secs > 0 && now.saturating_sub(payload.issued_at) > self.ttl_secs {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }
}

fn parse_payload(serialised: &str) -> Result<EventTokenPayload, TokenError> {
    let mut fields = serialised.split('\x1f');
    let mut next = || fields.next().ok_or(TokenError::Malformed);

    let request_id = next()?.to_string();
    let impression_id = next()?.to_string();
    let creative_id = next()?.to_string();
    let campaign_id = next()?.to_string();
    let line_item_id = next()?.to_string();
    let user_id = next()?.to_string();
    let publisher_id = next()?.to_string();
    let placement_id = next()?.to_string();
    let price_bits: u64 = next()?.parse().map_err(|_| TokenError::Malformed)?;
    let currency = next()?.to_string();
    let issued_at: i64 = next()?.parse().map_err(|_| TokenError::Malformed)?;

    let mut custom_params = BTreeMap::new();
    for remaining in fields {
        if remaining.is_empty() {
            continue;
        }
        let (key, value) = remaining.split_once('\x1e').ok_or(TokenError::Malformed)?;
        custom_params.insert(key.to_string(), value.to_string());
    }

    Ok(EventTokenPayload {
        request_id,
        impression_id,
        creative_id,
        campaign_id,
        line_item_id,
        user_id,
        publisher_id,
        placement_id,
        price: f64::from_bits(price_bits),
        currency,
        custom_params,
        issued_at,
    })
}

fn now_epoch() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

pub fn now() -> i64 {
    now_epoch()
}
