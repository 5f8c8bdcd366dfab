// Shared Access Signature tokens for the Notification Hubs REST API.
// The canonical string and parameter encoding must match the service's
// verifier byte for byte.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::clock::Clock;
use crate::connection::ConnectionDescriptor;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of a token and of the `X-Apns-Expiration` header
pub const TOKEN_TTL_SECS: i64 = 3600;

const TOKEN_PREFIX: &str = "SharedAccessSignature";

/// Signs requests with the key in a [`ConnectionDescriptor`]
#[derive(Debug, Clone)]
pub struct SasTokenGenerator {
    descriptor: ConnectionDescriptor,
}

impl SasTokenGenerator {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    /// Expiry (unix seconds) for a token issued now
    pub fn expiry(clock: &dyn Clock) -> i64 {
        clock.now_unix() + TOKEN_TTL_SECS
    }

    /// Token valid for one hour from `clock.now()`
    pub fn generate(&self, clock: &dyn Clock) -> String {
        self.token_for_expiry(Self::expiry(clock))
    }

    /// Token expiring at `expiry`. Pure: same descriptor and expiry, same token.
    pub fn token_for_expiry(&self, expiry: i64) -> String {
        let target_uri = self.target_uri();
        let signature = self.sign(&target_uri, expiry);
        let expiry = expiry.to_string();

        // Parameters in lexical key order
        let params = [
            ("se", expiry.as_str()),
            ("sig", signature.as_str()),
            ("skn", self.descriptor.key_name.as_str()),
            ("sr", target_uri.as_str()),
        ];

        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{} {}", TOKEN_PREFIX, query)
    }

    // The signature audience is the namespace root, never the URL being called.
    fn target_uri(&self) -> String {
        self.descriptor.base_uri().to_lowercase()
    }

    fn sign(&self, target_uri: &str, expiry: i64) -> String {
        let string_to_sign = format!("{}\n{}", urlencoding::encode(target_uri), expiry);

        let mut mac = HmacSha256::new_from_slice(self.descriptor.key_value().as_bytes())
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(string_to_sign.as_bytes());

        STANDARD.encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::connection::Scheme;

    fn generator(key_value: &str) -> SasTokenGenerator {
        SasTokenGenerator::new(ConnectionDescriptor::new(
            "testhub-ns.servicebus.windows.net",
            Scheme::Secure,
            "testAccessKeyName",
            key_value,
        ))
    }

    fn param(token: &str, name: &str) -> Option<String> {
        token
            .strip_prefix("SharedAccessSignature ")?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|value| value.into_owned())
    }

    #[test]
    fn test_known_signature_vector() {
        let token = generator("testKeyValue").token_for_expiry(123);
        assert_eq!(
            param(&token, "sig").as_deref(),
            Some("m8aSIZFx4Nfh5TiIL5T1UoVlfszaQzNwgL37GyXtxg0=")
        );
    }

    #[test]
    fn test_recorded_signature_vector() {
        let token = generator("testAccessKey").token_for_expiry(123);
        assert_eq!(
            param(&token, "sig").as_deref(),
            Some("cy3Y21BlsAw8slr5TnmSM3pilYBC8T7k3oNqOUKvE2g=")
        );
    }

    #[test]
    fn test_token_layout() {
        let token = generator("testKeyValue").token_for_expiry(123);
        assert_eq!(
            token,
            "SharedAccessSignature se=123&sig=m8aSIZFx4Nfh5TiIL5T1UoVlfszaQzNwgL37GyXtxg0%3D&skn=testAccessKeyName&sr=https%3A%2F%2Ftesthub-ns.servicebus.windows.net"
        );
        assert_eq!(
            param(&token, "sr").as_deref(),
            Some("https://testhub-ns.servicebus.windows.net")
        );
        assert_eq!(param(&token, "se").as_deref(), Some("123"));
        assert_eq!(param(&token, "skn").as_deref(), Some("testAccessKeyName"));
    }

    #[test]
    fn test_generate_is_deterministic_for_fixed_clock() {
        let clock = FixedClock::from_unix(1_700_000_000);
        let sas = generator("testKeyValue");

        let first = sas.generate(&clock);
        let second = sas.generate(&clock);
        assert_eq!(first, second);
        assert_eq!(
            param(&first, "se").as_deref(),
            Some("1700003600")
        );
    }

    #[test]
    fn test_target_uri_is_lowercased() {
        let sas = SasTokenGenerator::new(ConnectionDescriptor::new(
            "TestHub-NS.servicebus.windows.net",
            Scheme::Secure,
            "testAccessKeyName",
            "testKeyValue",
        ));
        assert_eq!(
            sas.token_for_expiry(123),
            generator("testKeyValue").token_for_expiry(123)
        );
    }

    #[test]
    fn test_empty_key_still_signs() {
        let token = generator("").token_for_expiry(123);
        assert_eq!(
            param(&token, "sig").as_deref(),
            Some("xmWSi1bUKtn0eU6EwZgWcfOAcRfZC78VI7NWjQuagnQ=")
        );
    }
}
