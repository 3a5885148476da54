//! Blocking of page sub-resources by type.
//!
//! Scrapers rarely need images, fonts, or stylesheets; aborting them in the
//! browser saves bandwidth and proxy traffic. [`ResourceType`] and the
//! presets are plain data; routing a live page requires the `browser`
//! feature.

use std::fmt;
use std::str::FromStr;

use scraper_tools::error::AppError;
use serde::{Deserialize, Serialize};

/// Kind of resource a page request loads, as reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Texttrack,
    Xhr,
    Fetch,
    Eventsource,
    Websocket,
    Manifest,
    Other,
}

impl ResourceType {
    pub const ALL: [ResourceType; 13] = [
        ResourceType::Document,
        ResourceType::Stylesheet,
        ResourceType::Image,
        ResourceType::Media,
        ResourceType::Font,
        ResourceType::Script,
        ResourceType::Texttrack,
        ResourceType::Xhr,
        ResourceType::Fetch,
        ResourceType::Eventsource,
        ResourceType::Websocket,
        ResourceType::Manifest,
        ResourceType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Image => "image",
            ResourceType::Media => "media",
            ResourceType::Font => "font",
            ResourceType::Script => "script",
            ResourceType::Texttrack => "texttrack",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::Eventsource => "eventsource",
            ResourceType::Websocket => "websocket",
            ResourceType::Manifest => "manifest",
            ResourceType::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|rt| rt.as_str() == wanted)
            .ok_or_else(|| AppError::ConfigError(format!("Unknown resource type '{s}'")))
    }
}

/// Default set of resource types to block.
///
/// Includes `document`: sub-frame documents (iframes) are aborted, while the
/// page's own main-frame document is always let through.
pub const LIGHT_BLOCK_PRESET: &[ResourceType] = &[
    ResourceType::Document,
    ResourceType::Stylesheet,
    ResourceType::Image,
    ResourceType::Media,
    ResourceType::Font,
    ResourceType::Texttrack,
];

/// Decides whether a paused request is aborted.
///
/// `main_document` marks the top-level navigation of the page, which is
/// never blocked even when `document` is in `blocked`.
pub fn should_block(kind: ResourceType, main_document: bool, blocked: &[ResourceType]) -> bool {
    !main_document && blocked.contains(&kind)
}

/// Parses a preset name (`light`, `none`) or a comma-separated list of
/// resource types.
pub fn parse_block_list(raw: &str) -> Result<Vec<ResourceType>, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "light" => Ok(LIGHT_BLOCK_PRESET.to_vec()),
        "none" | "" => Ok(Vec::new()),
        list => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ResourceType::from_str)
            .collect(),
    }
}

#[cfg(feature = "browser")]
mod routing {
    use std::fmt;
    use std::future::Future;
    use std::sync::Arc;

    use chromiumoxide::Page;
    use chromiumoxide::cdp::browser_protocol::fetch::{
        AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
        ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
        FailRequestParams, RequestPattern,
    };
    use chromiumoxide::cdp::browser_protocol::network::{
        ErrorReason, ResourceType as CdpResourceType,
    };
    use chromiumoxide::cdp::browser_protocol::page::FrameId;
    use chromiumoxide::error::CdpError;
    use futures::{Stream, StreamExt};
    use scraper_tools::error::AppError;
    use scraper_tools::proxy::BrowserProxy;

    use super::{ResourceType, should_block};

    impl From<&CdpResourceType> for ResourceType {
        fn from(value: &CdpResourceType) -> Self {
            match value {
                CdpResourceType::Document => ResourceType::Document,
                CdpResourceType::Stylesheet => ResourceType::Stylesheet,
                CdpResourceType::Image => ResourceType::Image,
                CdpResourceType::Media => ResourceType::Media,
                CdpResourceType::Font => ResourceType::Font,
                CdpResourceType::Script => ResourceType::Script,
                CdpResourceType::TextTrack => ResourceType::Texttrack,
                CdpResourceType::Xhr => ResourceType::Xhr,
                CdpResourceType::Fetch => ResourceType::Fetch,
                CdpResourceType::EventSource => ResourceType::Eventsource,
                CdpResourceType::WebSocket => ResourceType::Websocket,
                CdpResourceType::Manifest => ResourceType::Manifest,
                _ => ResourceType::Other,
            }
        }
    }

    enum Intercepted {
        Paused(Arc<EventRequestPaused>),
        Auth(Arc<EventAuthRequired>),
    }

    fn cdp_error(context: &str) -> impl Fn(CdpError) -> AppError + '_ {
        move |e| AppError::BrowserError(format!("{context}: {e}"))
    }

    /// Aborts every request on `page` whose type is in `resources`; all
    /// other requests continue untouched.
    pub async fn block_resources(page: &Page, resources: &[ResourceType]) -> Result<(), AppError> {
        route_requests(page, resources, None).await
    }

    /// Installs request interception on `page`.
    ///
    /// Paused requests of a blocked type fail with `BlockedByClient`, except
    /// the main frame's document. When `proxy` carries credentials, proxy
    /// auth challenges are answered with them. Interception stays active
    /// until the page is closed.
    pub async fn route_requests(
        page: &Page,
        resources: &[ResourceType],
        proxy: Option<&BrowserProxy>,
    ) -> Result<(), AppError> {
        let credentials = proxy
            .and_then(BrowserProxy::credentials)
            .map(|(u, p)| (u.to_string(), p.to_string()));

        if resources.is_empty() && credentials.is_none() {
            return Ok(());
        }

        let paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(cdp_error("Failed to listen for paused requests"))?
            .map(Intercepted::Paused);
        let auth = page
            .event_listener::<EventAuthRequired>()
            .await
            .map_err(cdp_error("Failed to listen for auth challenges"))?
            .map(Intercepted::Auth);

        let pattern = RequestPattern::builder().url_pattern("*").build();
        let enable = EnableParams::builder()
            .pattern(pattern)
            .handle_auth_requests(credentials.is_some())
            .build();
        page.execute(enable)
            .await
            .map_err(cdp_error("Failed to enable request interception"))?;

        let main_frame = page
            .mainframe()
            .await
            .map_err(cdp_error("Failed to resolve main frame"))?;
        let router = Router {
            page: page.clone(),
            blocked: resources.to_vec(),
            main_frame,
            credentials,
        };
        let events = Box::pin(futures::stream::select(paused, auth));

        tokio::spawn(async move {
            answer_events(events, |event| router.answer(event)).await;
        });

        Ok(())
    }

    /// Answers every event from `events` with `answer` until the stream ends
    /// (the page was closed).
    ///
    /// Requests cancelled mid-flight (redirects, aborted navigations) reject
    /// the reply; a failed answer is logged and later events are still
    /// answered.
    async fn answer_events<S, F, Fut, E>(mut events: S, mut answer: F)
    where
        S: Stream + Unpin,
        F: FnMut(S::Item) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        while let Some(event) = events.next().await {
            if let Err(e) = answer(event).await {
                tracing::debug!("Failed to answer intercepted request: {e}");
            }
        }
    }

    struct Router {
        page: Page,
        blocked: Vec<ResourceType>,
        main_frame: Option<FrameId>,
        credentials: Option<(String, String)>,
    }

    impl Router {
        async fn answer(&self, event: Intercepted) -> Result<(), CdpError> {
            match event {
                Intercepted::Paused(event) => {
                    let kind = ResourceType::from(&event.resource_type);
                    let main_document = kind == ResourceType::Document
                        && self.main_frame.as_ref() == Some(&event.frame_id);
                    if should_block(kind, main_document, &self.blocked) {
                        tracing::trace!(url = %event.request.url, %kind, "Blocking request");
                        self.page
                            .execute(FailRequestParams::new(
                                event.request_id.clone(),
                                ErrorReason::BlockedByClient,
                            ))
                            .await?;
                    } else {
                        self.page
                            .execute(ContinueRequestParams::new(event.request_id.clone()))
                            .await?;
                    }
                }
                Intercepted::Auth(event) => {
                    let response = match &self.credentials {
                        Some((username, password)) => AuthChallengeResponse::builder()
                            .response(AuthChallengeResponseResponse::ProvideCredentials)
                            .username(username.clone())
                            .password(password.clone())
                            .build(),
                        None => AuthChallengeResponse::builder()
                            .response(AuthChallengeResponseResponse::Default)
                            .build(),
                    };
                    match response {
                        Ok(response) => {
                            self.page
                                .execute(ContinueWithAuthParams::new(
                                    event.request_id.clone(),
                                    response,
                                ))
                                .await?;
                        }
                        Err(e) => tracing::warn!("Invalid auth challenge response: {e}"),
                    }
                }
            }
            Ok(())
        }
    }

}

#[cfg(feature = "browser")]
pub use routing::{block_resources, route_requests};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("image".parse::<ResourceType>().unwrap(), ResourceType::Image);
        assert_eq!(" XHR ".parse::<ResourceType>().unwrap(), ResourceType::Xhr);
        assert_eq!(
            "texttrack".parse::<ResourceType>().unwrap(),
            ResourceType::Texttrack
        );
        assert!(matches!(
            "pictures".parse::<ResourceType>(),
            Err(AppError::ConfigError(msg)) if msg.contains("'pictures'")
        ));
    }

    #[test]
    fn names_round_trip_through_display() {
        for rt in ResourceType::ALL {
            assert_eq!(rt.to_string().parse::<ResourceType>().unwrap(), rt);
        }
    }

    #[test]
    fn light_preset_matches_expected_types() {
        assert_eq!(
            LIGHT_BLOCK_PRESET,
            &[
                ResourceType::Document,
                ResourceType::Stylesheet,
                ResourceType::Image,
                ResourceType::Media,
                ResourceType::Font,
                ResourceType::Texttrack,
            ]
        );
        assert!(!LIGHT_BLOCK_PRESET.contains(&ResourceType::Script));
    }

    #[test]
    fn block_list_accepts_presets_and_lists() {
        assert_eq!(parse_block_list("light").unwrap(), LIGHT_BLOCK_PRESET.to_vec());
        assert!(parse_block_list("none").unwrap().is_empty());
        assert_eq!(
            parse_block_list("image, font,").unwrap(),
            vec![ResourceType::Image, ResourceType::Font]
        );
        assert!(parse_block_list("image,bogus").is_err());
    }

    #[test]
    fn light_preset_blocks_subframe_documents_only() {
        assert!(should_block(ResourceType::Document, false, LIGHT_BLOCK_PRESET));
        assert!(!should_block(ResourceType::Document, true, LIGHT_BLOCK_PRESET));
    }

    #[test]
    fn light_preset_blocks_assets_but_not_scripts() {
        assert!(should_block(ResourceType::Image, false, LIGHT_BLOCK_PRESET));
        assert!(should_block(ResourceType::Font, false, LIGHT_BLOCK_PRESET));
        assert!(!should_block(ResourceType::Script, false, LIGHT_BLOCK_PRESET));
        assert!(!should_block(ResourceType::Xhr, false, LIGHT_BLOCK_PRESET));
    }

    #[test]
    fn empty_block_list_lets_everything_through() {
        for rt in ResourceType::ALL {
            assert!(!should_block(rt, false, &[]));
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ResourceType::Eventsource).unwrap();
        assert_eq!(json, "\"eventsource\"");
    }
}
