// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-Stamp Protocol (TSP) / RFC 3161 client.

use {
    crate::{
        algorithm::DigestAlgorithm,
        asn1::{
            rfc3161::{
                MessageImprint, PkiStatus, TimeStampReq, TimeStampResp, TstInfo,
                OID_CONTENT_TYPE_TST_INFO,
            },
            rfc5652::{SignedData, OID_ID_SIGNED_DATA},
        },
        TimeStampError,
    },
    bcder::{decode::Constructed, encode::Values, Integer, Mode, OctetString, Oid},
    log::{debug, warn},
    ring::rand::{SecureRandom, SystemRandom},
    std::{ops::Deref, time::Duration},
};

pub const HTTP_CONTENT_TYPE_REQUEST: &str = "application/timestamp-query";

pub const HTTP_CONTENT_TYPE_RESPONSE: &str = "application/timestamp-reply";

/// Default deadline for a single TSA request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of attempts for a TSA request.
pub const DEFAULT_RETRY: u32 = 3;

/// Default base delay for exponential backoff between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Tunables for talking to a Time-Stamping Authority.
#[derive(Clone, Debug)]
pub struct TimeStampOptions {
    /// Algorithm for the message imprint.
    pub hash_algorithm: DigestAlgorithm,

    /// TSA policy OID to request, if any.
    pub policy: Option<Oid>,

    /// Ask the TSA to include its certificate in the token.
    pub request_certificate: bool,

    /// Per-request deadline.
    pub timeout: Duration,

    /// Total number of attempts for recoverable failures.
    pub retry: u32,

    /// Base delay for exponential backoff.
    pub retry_delay: Duration,

    /// Extra HTTP headers to send.
    pub headers: Vec<(String, String)>,
}

impl Default for TimeStampOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: DigestAlgorithm::Sha256,
            policy: None,
            request_certificate: true,
            timeout: DEFAULT_TIMEOUT,
            retry: DEFAULT_RETRY,
            retry_delay: DEFAULT_RETRY_DELAY,
            headers: Vec::new(),
        }
    }
}

/// Build a [TimeStampReq] over an already computed message hash.
///
/// A fresh 8 byte nonce from the system CSPRNG is attached so the
/// response can be bound to this exact request.
pub fn create_time_stamp_request(
    message_hash: &[u8],
    options: &TimeStampOptions,
) -> Result<TimeStampReq, TimeStampError> {
    if message_hash.len() != options.hash_algorithm.digest_len() {
        return Err(TimeStampError::UnsupportedAlgorithm(format!(
            "hash length {} does not match {}",
            message_hash.len(),
            options.hash_algorithm
        )));
    }

    let mut random = [0u8; 8];
    SystemRandom::new()
        .fill(&mut random)
        .map_err(|_| TimeStampError::Random)?;

    Ok(TimeStampReq {
        version: Integer::from(1),
        message_imprint: MessageImprint {
            hash_algorithm: options.hash_algorithm.into(),
            hashed_message: OctetString::new(bytes::Bytes::copy_from_slice(message_hash)),
        },
        req_policy: options.policy.clone(),
        nonce: Some(Integer::from(u64::from_le_bytes(random))),
        cert_req: Some(options.request_certificate),
        extensions: None,
    })
}

/// Parse a raw TimeStampResp.
pub fn parse_time_stamp_response(data: &[u8]) -> Result<TimeStampResponse, TimeStampError> {
    Ok(TimeStampResponse(Constructed::decode(
        data,
        Mode::Ber,
        |cons| TimeStampResp::take_from(cons),
    )?))
}

/// Send a [TimeStampReq] to a server via HTTP.
///
/// Recoverable failures (transport errors, HTTP 5xx, HTTP 429) are
/// retried up to `options.retry` times with exponential backoff. Other
/// HTTP failures are surfaced immediately. The per-attempt deadline is
/// `options.timeout`; an expired deadline on the final attempt becomes
/// [TimeStampError::Timeout].
pub fn send_time_stamp_request(
    url: &str,
    request: &TimeStampReq,
    options: &TimeStampOptions,
) -> Result<TimeStampResponse, TimeStampError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(options.timeout)
        .build()?;

    let mut body = Vec::<u8>::new();
    request
        .encode_ref()
        .write_encoded(Mode::Der, &mut body)?;

    let mut last_error = None;

    for attempt in 0..options.retry.max(1) {
        if attempt > 0 {
            let delay = options.retry_delay * 2u32.pow(attempt - 1);
            debug!("retrying TSA request in {:?} (attempt {})", delay, attempt + 1);
            std::thread::sleep(delay);
        }

        let mut builder = client
            .post(url)
            .header("Content-Type", HTTP_CONTENT_TYPE_REQUEST)
            .body(body.clone());

        for (name, value) in &options.headers {
            builder = builder.header(name, value);
        }

        let response = match builder.send() {
            Ok(response) => response,
            Err(e) => {
                debug!("TSA transport error: {}", e);
                last_error = Some(e);
                continue;
            }
        };

        let status = response.status();

        if status.is_server_error() || status.as_u16() == 429 {
            debug!("TSA returned HTTP {}, will retry", status);
            last_error = None;

            if attempt + 1 == options.retry.max(1) {
                return Err(TimeStampError::Http(format!(
                    "TSA returned HTTP {} after {} attempts",
                    status,
                    attempt + 1
                )));
            }

            continue;
        }

        if !status.is_success() {
            // Client errors are not recoverable by retrying.
            return Err(TimeStampError::TsaStatus(format!(
                "TSA returned HTTP {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type != HTTP_CONTENT_TYPE_RESPONSE {
            // Several public TSAs reply with a generic content type.
            // The body decides whether the response is usable.
            warn!(
                "unexpected TSA response content type: {:?} (expected {})",
                content_type, HTTP_CONTENT_TYPE_RESPONSE
            );
        }

        let response_bytes = response.bytes()?;

        let res = parse_time_stamp_response(response_bytes.as_ref())?;

        // Verify the nonce was reflected, if the response carries one.
        if res.is_success() {
            if let Some(tst_info) = res.tst_info()? {
                if tst_info.nonce.is_some() && tst_info.nonce != request.nonce {
                    return Err(TimeStampError::NonceMismatch);
                }
            }
        }

        return Ok(res);
    }

    Err(match last_error {
        Some(e) if e.is_timeout() => TimeStampError::Timeout,
        Some(e) => TimeStampError::Network {
            attempts: options.retry.max(1),
            message: e.to_string(),
        },
        None => TimeStampError::Network {
            attempts: options.retry.max(1),
            message: "request retries exhausted".to_string(),
        },
    })
}

/// Hash a message and request a timestamp over it.
pub fn time_stamp_message(
    url: &str,
    message: &[u8],
    options: &TimeStampOptions,
) -> Result<(TimeStampReq, TimeStampResponse), TimeStampError> {
    let digest = options.hash_algorithm.digest_data(message);

    let request = create_time_stamp_request(&digest, options)?;
    let response = send_time_stamp_request(url, &request, options)?;

    Ok((request, response))
}

/// High-level interface to [TimeStampResp].
pub struct TimeStampResponse(TimeStampResp);

impl Deref for TimeStampResponse {
    type Target = TimeStampResp;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TimeStampResponse {
    /// Whether the time stamp request was granted.
    pub fn is_success(&self) -> bool {
        matches!(
            self.0.status.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        )
    }

    /// A human-readable rendering of the response status.
    pub fn status_description(&self) -> String {
        let mut description = self.0.status.status.to_string();

        if let Some(text) = &self.0.status.status_string {
            let text = text.to_string_lossy();
            if !text.is_empty() {
                description.push_str(&format!(" ({})", text));
            }
        }

        if let Some(fail_info) = self.0.status.fail_info {
            description.push_str(&format!(": {}", fail_info));
        }

        description
    }

    /// The size in bytes of the DER-encoded token.
    pub fn token_content_size(&self) -> Option<usize> {
        self.token_der().ok().flatten().map(|token| token.len())
    }

    /// Re-encode the token to strict DER.
    ///
    /// Responses are BER on the wire; the bytes embedded into documents
    /// are always the definite-length DER form.
    pub fn token_der(&self) -> Result<Option<Vec<u8>>, TimeStampError> {
        if let Some(token) = &self.0.time_stamp_token {
            let mut der = Vec::new();
            token.encode_ref().write_encoded(Mode::Der, &mut der)?;

            Ok(Some(der))
        } else {
            Ok(None)
        }
    }

    /// Decode the `SignedData` value in the response.
    pub fn signed_data(&self) -> Result<Option<SignedData>, TimeStampError> {
        if let Some(token) = &self.0.time_stamp_token {
            if token.content_type == OID_ID_SIGNED_DATA {
                Ok(Some(
                    Constructed::decode(token.content.as_slice(), Mode::Ber, |cons| {
                        SignedData::take_from(cons)
                    })
                    .map_err(|e| TimeStampError::InvalidResponse(e.to_string()))?,
                ))
            } else {
                Err(TimeStampError::InvalidResponse(
                    "invalid OID on signed data".to_string(),
                ))
            }
        } else {
            Ok(None)
        }
    }

    /// Decode the `TSTInfo` encapsulated in the token.
    pub fn tst_info(&self) -> Result<Option<TstInfo>, TimeStampError> {
        if let Some(signed_data) = self.signed_data()? {
            if signed_data.content_info.content_type == OID_CONTENT_TYPE_TST_INFO {
                if let Some(content) = signed_data.content_info.content {
                    Ok(Some(
                        Constructed::decode(content.to_bytes(), Mode::Der, |cons| {
                            TstInfo::take_from(cons)
                        })
                        .map_err(|e| TimeStampError::InvalidResponse(e.to_string()))?,
                    ))
                } else {
                    Ok(None)
                }
            } else {
                Ok(None)
            }
        } else {
            Ok(None)
        }
    }

    /// Extract the descriptive summary of the token.
    pub fn timestamp_info(&self) -> Result<Option<TimestampInfo>, TimeStampError> {
        match self.token_der()? {
            Some(der) => token_info(&der).map(Some),
            None => Ok(None),
        }
    }
}

/// Summarize a bare timestamp token (a `ContentInfo` wrapping
/// `SignedData` whose content is a `TSTInfo`).
///
/// This is the entry point for tokens already embedded in documents,
/// as opposed to tokens freshly received in a [TimeStampResponse].
pub fn token_info(token: &[u8]) -> Result<TimestampInfo, TimeStampError> {
    let content_info = Constructed::decode(token, Mode::Ber, |cons| {
        crate::asn1::rfc5652::ContentInfo::take_from(cons)
    })?;

    if content_info.content_type != OID_ID_SIGNED_DATA {
        return Err(TimeStampError::InvalidResponse(
            "token is not a signed-data ContentInfo".to_string(),
        ));
    }

    let signed_data = Constructed::decode(content_info.content.as_slice(), Mode::Ber, |cons| {
        SignedData::take_from(cons)
    })
    .map_err(|e| TimeStampError::InvalidResponse(e.to_string()))?;

    if signed_data.content_info.content_type != OID_CONTENT_TYPE_TST_INFO {
        return Err(TimeStampError::InvalidResponse(
            "encapsulated content is not a TSTInfo".to_string(),
        ));
    }

    let content = signed_data.content_info.content.as_ref().ok_or_else(|| {
        TimeStampError::InvalidResponse("token carries no TSTInfo content".to_string())
    })?;

    let tst_info = Constructed::decode(content.to_bytes(), Mode::Der, |cons| {
        TstInfo::take_from(cons)
    })
    .map_err(|e| TimeStampError::InvalidResponse(e.to_string()))?;

    let hash_algorithm = DigestAlgorithm::try_from(&tst_info.message_imprint.hash_algorithm)?;

    Ok(TimestampInfo {
        gen_time: tst_info.gen_time.clone().into(),
        policy: format!("{}", tst_info.policy),
        serial_number_hex: hex::encode(tst_info.serial_number.as_slice()),
        hash_algorithm,
        message_digest_hex: hex::encode(
            tst_info.message_imprint.hashed_message.to_bytes().as_ref(),
        ),
        accuracy_seconds: tst_info
            .accuracy
            .as_ref()
            .and_then(|accuracy| accuracy.seconds.as_ref())
            .and_then(|seconds| {
                let bytes = seconds.as_slice();
                (bytes.len() <= 8)
                    .then(|| bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
            }),
        has_certificate: signed_data
            .certificates
            .as_ref()
            .map(|certs| !certs.is_empty())
            .unwrap_or(false),
    })
}

/// Summary of a timestamp token, as surfaced to callers and the CLI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimestampInfo {
    /// The authoritative time, normalized to UTC.
    pub gen_time: chrono::DateTime<chrono::Utc>,

    /// The TSA policy the token was issued under, in dotted form.
    pub policy: String,

    /// Token serial number, lowercase hex.
    pub serial_number_hex: String,

    /// Imprint hash algorithm.
    pub hash_algorithm: DigestAlgorithm,

    /// Imprint digest, lowercase hex.
    pub message_digest_hex: String,

    /// Declared accuracy in whole seconds, when present.
    pub accuracy_seconds: Option<u64>,

    /// Whether the token embeds the TSA certificate.
    pub has_certificate: bool,
}

/// Whether a token's imprint matches the hash the caller requested.
///
/// True iff the algorithm matches and the digests are byte-identical,
/// compared case-insensitively in hex space.
pub fn validate_response(
    info: &TimestampInfo,
    original_hash: &[u8],
    algorithm: DigestAlgorithm,
) -> bool {
    info.hash_algorithm == algorithm
        && info.message_digest_hex.to_lowercase() == hex::encode(original_hash)
}

#[cfg(test)]
mod test {
    use super::*;

    /// TimeStampResp carrying status 2 (rejection) and status string "er".
    const REJECTION_RESPONSE: &[u8] = &[
        0x30, 0x0b, 0x30, 0x09, 0x02, 0x01, 0x02, 0x30, 0x04, 0x0c, 0x02, 0x65, 0x72,
    ];

    #[test]
    fn parse_rejection_response() {
        let response = parse_time_stamp_response(REJECTION_RESPONSE).unwrap();

        assert!(!response.is_success());
        assert_eq!(response.status.status, PkiStatus::Rejection);
        assert!(response.time_stamp_token.is_none());
        assert!(response.status_description().contains("rejection"));
        assert!(response.status_description().contains("er"));
    }

    #[test]
    fn request_has_nonce_and_cert_req() {
        let options = TimeStampOptions::default();
        let hash = options.hash_algorithm.digest_data(b"hello, world");

        let request = create_time_stamp_request(&hash, &options).unwrap();

        assert_eq!(request.version, Integer::from(1));
        assert!(request.nonce.is_some());
        assert_eq!(request.cert_req, Some(true));
        assert_eq!(
            request.message_imprint.hashed_message.to_bytes().as_ref(),
            hash.as_slice()
        );

        // The request must serialize to DER.
        let der = request.encode_der().unwrap();
        let round_tripped =
            Constructed::decode(der.as_slice(), Mode::Der, |cons| TimeStampReq::take_from(cons))
                .unwrap();
        assert_eq!(round_tripped, request);
    }

    #[test]
    fn hash_length_mismatch_rejected() {
        let options = TimeStampOptions::default();

        assert!(matches!(
            create_time_stamp_request(&[0u8; 16], &options),
            Err(TimeStampError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn validate_response_compares_algorithm_and_digest() {
        let hash = DigestAlgorithm::Sha256.digest_data(b"data");

        let info = TimestampInfo {
            gen_time: chrono::Utc::now(),
            policy: "1.2.3".to_string(),
            serial_number_hex: "01".to_string(),
            hash_algorithm: DigestAlgorithm::Sha256,
            message_digest_hex: hex::encode(&hash).to_uppercase(),
            accuracy_seconds: None,
            has_certificate: true,
        };

        assert!(validate_response(&info, &hash, DigestAlgorithm::Sha256));
        assert!(!validate_response(&info, &hash, DigestAlgorithm::Sha384));
        assert!(!validate_response(
            &info,
            &DigestAlgorithm::Sha256.digest_data(b"other"),
            DigestAlgorithm::Sha256
        ));
    }
}
