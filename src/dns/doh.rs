//! DNS-over-HTTPS forwarding (RFC 8484 wire format over POST).

use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::resolver::DnsResolver;
use crate::error::{Result, UpstreamError};

/// Media type of a binary DNS message.
pub const DNS_MESSAGE_MEDIA_TYPE: &str = "application/dns-message";

/// Client-wide request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// User-Agent header value for HTTP requests.
const USER_AGENT: &str = concat!("homenet/", env!("CARGO_PKG_VERSION"));

/// Forwards queries to a DoH endpoint.
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: Client,
    endpoint: String,
}

impl DohResolver {
    /// Create a resolver posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(UpstreamError::ClientBuild)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DnsResolver for DohResolver {
    async fn resolve(&self, query: &Message) -> Result<Message> {
        let body = query.to_bytes()?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, DNS_MESSAGE_MEDIA_TYPE)
            .header(ACCEPT, DNS_MESSAGE_MEDIA_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(UpstreamError::HttpStatus {
                status: response.status().as_u16(),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;

        Ok(Message::from_bytes(&bytes).map_err(UpstreamError::MalformedBody)?)
    }
}

impl DohResolver {
    fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout {
                upstream: self.endpoint.clone(),
            }
        } else {
            UpstreamError::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use hickory_proto::op::{MessageType, OpCode, Query, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query(id: u16) -> Message {
        let mut message = Message::new();
        message.set_id(id).set_recursion_desired(true);
        message.add_query(Query::query(
            Name::from_str("ok.test.").unwrap(),
            RecordType::A,
        ));
        message
    }

    fn answer_for(query: &Message) -> Vec<u8> {
        let mut response = Message::new();
        response
            .set_id(query.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(ResponseCode::NoError);
        response.add_queries(query.queries().iter().cloned());
        response.add_answer(Record::from_rdata(
            Name::from_str("ok.test.").unwrap(),
            60,
            RData::A(A(Ipv4Addr::new(10, 1, 2, 3))),
        ));
        response.to_bytes().unwrap()
    }

    #[tokio::test]
    async fn should_post_wire_message_and_decode_answer() {
        let server = MockServer::start().await;
        let query = query(42);
        Mock::given(method("POST"))
            .and(path("/dns-query"))
            .and(header("content-type", DNS_MESSAGE_MEDIA_TYPE))
            .and(header("accept", DNS_MESSAGE_MEDIA_TYPE))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(answer_for(&query), DNS_MESSAGE_MEDIA_TYPE),
            )
            .expect(1)
            .mount(&server)
            .await;
        let resolver = DohResolver::new(format!("{}/dns-query", server.uri())).unwrap();

        let response = resolver.resolve(&query).await.unwrap();

        assert_eq!(response.id(), 42);
        assert_eq!(response.answers().len(), 1);
        let a = response.answers()[0].data().as_a().unwrap();
        assert_eq!(a.0, Ipv4Addr::new(10, 1, 2, 3));
    }

    #[tokio::test]
    async fn should_fail_on_non_200_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let resolver = DohResolver::new(server.uri()).unwrap();

        let result = resolver.resolve(&query(1)).await;

        assert!(matches!(
            result,
            Err(Error::Upstream(UpstreamError::HttpStatus { status: 500 }))
        ));
    }

    #[tokio::test]
    async fn should_fail_on_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0x01, 0x02], DNS_MESSAGE_MEDIA_TYPE),
            )
            .mount(&server)
            .await;
        let resolver = DohResolver::new(server.uri()).unwrap();

        let result = resolver.resolve(&query(1)).await;

        assert!(matches!(
            result,
            Err(Error::Upstream(UpstreamError::MalformedBody(_)))
        ));
    }

    #[tokio::test]
    async fn should_fail_when_endpoint_is_unreachable() {
        let resolver = DohResolver::new("http://127.0.0.1:1/dns-query").unwrap();

        let result = resolver.resolve(&query(1)).await;

        assert!(matches!(result, Err(Error::Upstream(_))));
    }
}
