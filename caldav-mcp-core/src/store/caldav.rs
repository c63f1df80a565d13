//! CalDAV store backed by libdav.
//!
//! Discovery follows the usual principal → calendar-home-set chain on connect.
//! Requests libdav has no builder for (time-range REPORT, collection PROPFIND,
//! DELETE) are implemented here as custom [`DavRequest`]s.

use std::sync::Arc;

use http::{Method, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use libdav::CalDavClient;
use libdav::caldav::{FindCalendarHomeSet, GetCalendarResources};
use libdav::dav::{GetEtag, PutResource, WebDavClient, mime_types};
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tower::ServiceBuilder;
use tower_http::{auth::AddAuthorization, follow_redirect::FollowRedirect};
use tracing::{debug, info, warn};

use super::{CalendarSession, Collection, Connector, id_from_href};
use crate::config::Settings;
use crate::error::{CalDavError, CalDavResult};
use crate::native::NativeRecord;
use crate::record::RecordKind;
use crate::time::TimeRange;

type HttpsConnector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// HTTP client with basic auth and redirect following.
type HttpClient = FollowRedirect<AddAuthorization<Client<HttpsConnector, String>>>;

/// Connects to a CalDAV server using the resolved settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalDavConnector;

impl Connector for CalDavConnector {
    type Session = CalDavSession;

    async fn connect(&self, settings: &Settings) -> CalDavResult<CalDavSession> {
        let caldav = create_client(settings)?;

        let principal = caldav
            .find_current_user_principal()
            .await
            .map_err(|e| {
                CalDavError::Authentication(format!(
                    "Failed to reach {}: {}",
                    settings.server_url, e
                ))
            })?
            .ok_or_else(|| {
                CalDavError::Authentication(format!(
                    "No principal found for user '{}'. Check username and password.",
                    settings.username
                ))
            })?;

        let home_set = caldav
            .request(FindCalendarHomeSet::new(&principal))
            .await
            .map_err(|e| CalDavError::Authentication(format!("Failed to find calendar home set: {}", e)))?
            .home_sets
            .into_iter()
            .next()
            .ok_or_else(|| {
                CalDavError::Authentication("No calendar home set found for this account".into())
            })?;

        info!(
            "Connected to {} (calendar home {})",
            settings.server_url,
            home_set.path()
        );

        Ok(CalDavSession {
            caldav,
            home_set: home_set.path().to_string(),
        })
    }
}

/// Live session against a CalDAV server.
pub struct CalDavSession {
    caldav: CalDavClient<HttpClient>,
    home_set: String,
}

impl std::fmt::Debug for CalDavSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalDavSession")
            .field("home_set", &self.home_set)
            .finish_non_exhaustive()
    }
}

impl CalendarSession for CalDavSession {
    async fn calendars(&self) -> CalDavResult<Vec<Collection>> {
        let response = self
            .caldav
            .request(ListCalendarCollections::new(&self.home_set))
            .await
            .map_err(|e| CalDavError::Store(format!("Failed to list calendars: {}", e)))?;
        Ok(response.collections)
    }

    async fn fetch(&self, collection: &Collection, id: &str) -> CalDavResult<NativeRecord> {
        let href = collection.resource_href(id)?;
        let response = self
            .caldav
            .request(GetCalendarResources::new(&collection.href).with_hrefs([&href]))
            .await
            .map_err(|e| CalDavError::Store(format!("Failed to fetch {}: {}", href, e)))?;

        let resource = response
            .resources
            .into_iter()
            .next()
            .ok_or_else(|| CalDavError::NotFound(id.to_string()))?;
        let Ok(content) = resource.content else {
            return Err(CalDavError::NotFound(id.to_string()));
        };

        NativeRecord::from_ics(Some(id.to_string()), Some(href), &content.data)
    }

    async fn fetch_all(&self, collection: &Collection) -> CalDavResult<Vec<NativeRecord>> {
        let response = self
            .caldav
            .request(GetCalendarResources::new(&collection.href))
            .await
            .map_err(|e| {
                CalDavError::Store(format!("Failed to fetch {}: {}", collection.href, e))
            })?;

        let mut records = Vec::new();
        for resource in response.resources {
            let Ok(content) = resource.content else {
                continue;
            };
            match NativeRecord::from_ics(
                Some(id_from_href(&resource.href)),
                Some(resource.href.clone()),
                &content.data,
            ) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unparseable resource {}: {}", resource.href, e),
            }
        }
        Ok(records)
    }

    async fn query(
        &self,
        collection: &Collection,
        kind: RecordKind,
        range: &TimeRange,
    ) -> CalDavResult<Vec<NativeRecord>> {
        let (start, end) = range.caldav_bounds();
        debug!(
            "calendar-query {} {} in {}..{}",
            collection.href,
            kind.component_name(),
            start,
            end
        );

        let response = self
            .caldav
            .request(GetCalendarResourcesInRange::new(
                &collection.href,
                kind.component_name(),
                &start,
                &end,
            ))
            .await
            .map_err(|e| CalDavError::Store(format!("Failed to query {}: {}", collection.href, e)))?;

        let mut records = Vec::new();
        for resource in response.resources {
            match NativeRecord::from_ics(
                Some(id_from_href(&resource.href)),
                Some(resource.href.clone()),
                &resource.data,
            ) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unparseable resource {}: {}", resource.href, e),
            }
        }
        Ok(records)
    }

    async fn save(&self, collection: &Collection, record: &NativeRecord) -> CalDavResult<String> {
        let id = record
            .id
            .clone()
            .or_else(|| record.uid())
            .ok_or_else(|| CalDavError::InvalidParameters("Record has no identifier".into()))?;
        let ics_content = record.to_ics();

        match &record.href {
            None => {
                // PUT with If-None-Match: * so an existing resource is never clobbered
                let href = collection.resource_href(&id)?;
                self.caldav
                    .request(PutResource::new(&href).create(&ics_content, mime_types::CALENDAR))
                    .await
                    .map_err(|e| CalDavError::Store(format!("Failed to create {}: {}", href, e)))?;
            }
            Some(href) => {
                let etag_response = self
                    .caldav
                    .request(GetEtag::new(href))
                    .await
                    .map_err(|e| CalDavError::NotFound(format!("{} ({})", id, e)))?;

                self.caldav
                    .request(PutResource::new(href).update(
                        &ics_content,
                        mime_types::CALENDAR,
                        &etag_response.etag,
                    ))
                    .await
                    .map_err(|e| CalDavError::Store(format!("Failed to update {}: {}", href, e)))?;
            }
        }
        Ok(id)
    }

    async fn delete(&self, collection: &Collection, record: &NativeRecord) -> CalDavResult<()> {
        let href = match (&record.href, &record.id) {
            (Some(href), _) => href.clone(),
            (None, Some(id)) => collection.resource_href(id)?,
            (None, None) => {
                return Err(CalDavError::InvalidParameters("Record has no identifier".into()));
            }
        };

        self.caldav
            .request(DeleteResource::new(&href))
            .await
            .map_err(|e| CalDavError::Store(format!("Failed to delete {}: {}", href, e)))?;
        Ok(())
    }
}

/// Build a libdav client with basic auth and redirect following.
///
/// `use_ssl = false` keeps TLS but skips certificate verification.
fn create_client(settings: &Settings) -> CalDavResult<CalDavClient<HttpClient>> {
    let url = url::Url::parse(&settings.server_url)
        .map_err(|e| CalDavError::Config(format!("Invalid server URL {}: {}", settings.server_url, e)))?;
    let uri: Uri = url
        .as_str()
        .parse()
        .map_err(|e| CalDavError::Config(format!("Invalid server URL {}: {}", url, e)))?;

    let https_connector = if settings.use_ssl {
        HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| CalDavError::Authentication(format!("Failed to load native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build()
    } else {
        HttpsConnectorBuilder::new()
            .with_tls_config(unverified_tls_config()?)
            .https_or_http()
            .enable_http1()
            .build()
    };

    let http_client = Client::builder(TokioExecutor::new()).build(https_connector);
    let auth_client = AddAuthorization::basic(http_client, &settings.username, &settings.password);
    let client = ServiceBuilder::new()
        .layer(tower_http::follow_redirect::FollowRedirectLayer::new())
        .service(auth_client);

    let webdav = WebDavClient::new(uri, client);
    Ok(CalDavClient::new(webdav))
}

fn unverified_tls_config() -> CalDavResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| CalDavError::Config(format!("TLS setup failed: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
        .with_no_client_auth();
    Ok(config)
}

/// Accepts any server certificate; signatures are still checked.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ============================================================================
// Custom requests
// ============================================================================

/// calendar-query REPORT with a time-range filter on one component kind.
pub struct GetCalendarResourcesInRange<'a> {
    collection_href: &'a str,
    component: &'a str,
    start: &'a str,
    end: &'a str,
}

impl<'a> GetCalendarResourcesInRange<'a> {
    /// `start` and `end` must be in CalDAV format: `YYYYMMDDTHHMMSSZ`
    pub fn new(collection_href: &'a str, component: &'a str, start: &'a str, end: &'a str) -> Self {
        Self {
            collection_href,
            component,
            start,
            end,
        }
    }
}

#[derive(Debug)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

#[derive(Debug)]
pub struct GetCalendarResourcesInRangeResponse {
    pub resources: Vec<CalendarResource>,
}

impl DavRequest for GetCalendarResourcesInRange<'_> {
    type Response = GetCalendarResourcesInRangeResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        Ok(PreparedRequest {
            method: Method::from_bytes(b"REPORT")?,
            path: self.collection_href.to_string(),
            body: calendar_query_body(self.component, self.start, self.end),
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }

        let resources = parse_calendar_resources(body)?;
        Ok(GetCalendarResourcesInRangeResponse { resources })
    }
}

fn calendar_query_body(component: &str, start: &str, end: &str) -> String {
    format!(
        r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="{}">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
        component, start, end
    )
}

fn parse_calendar_resources(body: &[u8]) -> Result<Vec<CalendarResource>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;

    let mut resources = Vec::new();
    for response in doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
    {
        let Some(href) = child_text(&response, "href") else {
            continue;
        };
        let etag = child_text(&response, "getetag");

        // Only resources carrying calendar data are of interest
        if let Some(data) = child_text(&response, "calendar-data") {
            resources.push(CalendarResource { href, etag, data });
        }
    }
    Ok(resources)
}

/// PROPFIND (Depth 1) on the calendar home, keeping calendar collections only.
pub struct ListCalendarCollections<'a> {
    home_set: &'a str,
}

impl<'a> ListCalendarCollections<'a> {
    pub fn new(home_set: &'a str) -> Self {
        Self { home_set }
    }
}

#[derive(Debug)]
pub struct ListCalendarCollectionsResponse {
    pub collections: Vec<Collection>,
}

impl DavRequest for ListCalendarCollections<'_> {
    type Response = ListCalendarCollectionsResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

        Ok(PreparedRequest {
            method: Method::from_bytes(b"PROPFIND")?,
            path: self.home_set.to_string(),
            body: body.to_string(),
            headers: vec![
                ("Depth".to_string(), "1".to_string()),
                (
                    "Content-Type".to_string(),
                    "application/xml; charset=utf-8".to_string(),
                ),
            ],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }

        Ok(ListCalendarCollectionsResponse {
            collections: parse_calendar_collections(body, self.home_set)?,
        })
    }
}

const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

fn parse_calendar_collections(
    body: &[u8],
    home_set: &str,
) -> Result<Vec<Collection>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let home = home_set.trim_end_matches('/');

    let mut collections = Vec::new();
    for response in doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
    {
        let is_calendar = response
            .descendants()
            .filter(|n| n.tag_name().name() == "resourcetype")
            .flat_map(|n| n.children())
            .any(|n| n.tag_name().name() == "calendar" && n.tag_name().namespace() == Some(CALDAV_NS));
        if !is_calendar {
            continue;
        }

        let Some(href) = child_text(&response, "href") else {
            continue;
        };
        // The home set itself is a collection, never a calendar
        if href.trim_end_matches('/') == home {
            continue;
        }

        let name = child_text(&response, "displayname").unwrap_or_else(|| id_from_href(&href));
        collections.push(Collection::new(href, name));
    }
    Ok(collections)
}

/// Unconditional DELETE of one resource.
pub struct DeleteResource<'a> {
    href: &'a str,
}

impl<'a> DeleteResource<'a> {
    pub fn new(href: &'a str) -> Self {
        Self { href }
    }
}

impl DavRequest for DeleteResource<'_> {
    type Response = ();
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> Result<PreparedRequest, http::Error> {
        Ok(PreparedRequest {
            method: Method::DELETE,
            path: self.href.to_string(),
            body: String::new(),
            headers: Vec::new(),
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        _body: &[u8],
    ) -> Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }
        Ok(())
    }
}

fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/dav/calendars/alice/</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/work/</d:href>
    <d:propstat><d:prop>
      <d:displayname>Work</d:displayname>
      <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/inbox/</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/><c:schedule-inbox/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/personal</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn test_collection_listing_keeps_calendars_only() {
        let collections =
            parse_calendar_collections(MULTISTATUS.as_bytes(), "/dav/calendars/alice/").unwrap();

        assert_eq!(
            collections,
            vec![
                Collection::new("/dav/calendars/alice/work/", "Work"),
                Collection::new("/dav/calendars/alice/personal/", "personal"),
            ]
        );
    }

    #[test]
    fn test_calendar_query_resources_need_data() {
        let body = r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/cal/a.ics</d:href>
    <d:propstat><d:prop>
      <d:getetag>"1"</d:getetag>
      <c:calendar-data>BEGIN:VCALENDAR
END:VCALENDAR</c:calendar-data>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/cal/b.ics</d:href>
    <d:propstat><d:prop><d:getetag>"2"</d:getetag></d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

        let resources = parse_calendar_resources(body.as_bytes()).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].href, "/cal/a.ics");
        assert_eq!(resources[0].etag.as_deref(), Some("\"1\""));
    }

    #[test]
    fn test_query_body_filters_requested_component() {
        let body = calendar_query_body("VTODO", "20250101T000000Z", "20250131T235959Z");
        assert!(body.contains(r#"<C:comp-filter name="VTODO">"#));
        assert!(body.contains(r#"start="20250101T000000Z" end="20250131T235959Z""#));
    }

    #[test]
    fn test_invalid_server_url_is_config_error() {
        let settings = Settings {
            server_url: "not a url".to_string(),
            ..Settings::default()
        };
        let err = create_client(&settings).err().expect("Should reject URL");
        assert!(matches!(err, CalDavError::Config(_)), "got {err:?}");
    }
}
