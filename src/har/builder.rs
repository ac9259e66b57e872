//! HAR assembly from recorded protocol events.
//!
//! Pages are anchored on top-level document requests. Page lifecycle events
//! are matched to pages by timestamp, so the relative order of page and
//! network records in the input does not matter.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use url::Url;

use super::ArchiveSerializer;
use super::types::{
    Cache, Content, Creator, Entry, Har, HarPage, HarRequest, HarResponse, Header, Log,
    PageTimings, PostData, QueryParam, Timings,
};
use crate::capture::ObservedEvent;
use crate::error::Result;
use crate::protocol::event::{
    NETWORK_DATA_RECEIVED, NETWORK_LOADING_FAILED, NETWORK_LOADING_FINISHED,
    NETWORK_REQUEST_SERVED_FROM_CACHE, NETWORK_REQUEST_WILL_BE_SENT,
    NETWORK_RESOURCE_CHANGED_PRIORITY, NETWORK_RESPONSE_RECEIVED, PAGE_DOM_CONTENT_EVENT_FIRED,
    PAGE_FRAME_ATTACHED, PAGE_FRAME_STARTED_LOADING, PAGE_LOAD_EVENT_FIRED,
};

// ============================================================================
// Constants
// ============================================================================

/// HAR format version written to `log.version`.
pub const HAR_VERSION: &str = "1.2";

const DOCUMENT_RESOURCE: &str = "Document";

// ============================================================================
// HarSerializer
// ============================================================================

/// Builds a HAR 1.2 archive from recorded events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarSerializer {
    creator: Creator,
}

impl Default for HarSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl HarSerializer {
    /// Creates a serializer that names this crate as the creator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_creator(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    /// Creates a serializer with a custom `log.creator`.
    #[must_use]
    pub fn with_creator(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            creator: Creator {
                name: name.into(),
                version: version.into(),
            },
        }
    }

    /// Builds the archive.
    ///
    /// Records that do not parse are skipped.
    #[must_use]
    pub fn build(&self, events: &[ObservedEvent], include_bodies: bool) -> Har {
        let mut builder = ArchiveBuilder::default();
        for event in events {
            builder.apply(event);
        }
        builder.finish(self.creator.clone(), include_bodies)
    }
}

impl ArchiveSerializer for HarSerializer {
    type Output = Har;

    fn serialize(&self, events: &[ObservedEvent], include_bodies: bool) -> Result<Har> {
        Ok(self.build(events, include_bodies))
    }
}

// ============================================================================
// Event Params
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameAttached {
    frame_id: String,
    #[serde(default)]
    parent_frame_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameStartedLoading {
    frame_id: String,
}

#[derive(Debug, Deserialize)]
struct Lifecycle {
    timestamp: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSent {
    request_id: String,
    request: RequestData,
    timestamp: f64,
    #[serde(default)]
    wall_time: Option<f64>,
    #[serde(default)]
    frame_id: Option<String>,
    #[serde(default, rename = "type")]
    resource_type: Option<String>,
    #[serde(default)]
    redirect_response: Option<ResponseData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestData {
    url: String,
    method: String,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    post_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default, rename = "remoteIPAddress")]
    remote_ip_address: Option<String>,
    #[serde(default)]
    connection_id: Option<f64>,
    #[serde(default)]
    timing: Option<ResourceTiming>,
    #[serde(default)]
    from_disk_cache: bool,
    #[serde(default)]
    body: Option<String>,
}

/// Phase offsets in milliseconds relative to `request_time` (seconds).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceTiming {
    request_time: f64,
    #[serde(default = "unset")]
    dns_start: f64,
    #[serde(default = "unset")]
    dns_end: f64,
    #[serde(default = "unset")]
    connect_start: f64,
    #[serde(default = "unset")]
    connect_end: f64,
    #[serde(default = "unset")]
    ssl_start: f64,
    #[serde(default = "unset")]
    ssl_end: f64,
    #[serde(default = "unset")]
    send_start: f64,
    #[serde(default = "unset")]
    send_end: f64,
    #[serde(default = "unset")]
    receive_headers_end: f64,
}

fn unset() -> f64 {
    -1.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReceived {
    request_id: String,
    response: ResponseData,
    #[serde(default, rename = "type")]
    resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataReceived {
    request_id: String,
    #[serde(default)]
    data_length: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFinished {
    request_id: String,
    timestamp: f64,
    #[serde(default)]
    encoded_data_length: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFailed {
    request_id: String,
    timestamp: f64,
    #[serde(default)]
    error_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestOnly {
    request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceChangedPriority {
    request_id: String,
    new_priority: String,
}

fn parse<'a, T: Deserialize<'a>>(event: &'a ObservedEvent) -> Option<T> {
    match T::deserialize(&event.params) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(method = %event.method, error = %e, "Skipping malformed event");
            None
        }
    }
}

// ============================================================================
// Builder State
// ============================================================================

#[derive(Debug)]
struct EntryState {
    request_id: String,
    frame_id: Option<String>,
    resource_type: Option<String>,
    navigation: bool,
    start_ts: f64,
    wall_time: Option<f64>,
    request: RequestData,
    response: Option<ResponseData>,
    end_ts: Option<f64>,
    data_length: i64,
    encoded_length: Option<i64>,
    served_from_cache: bool,
    priority: Option<String>,
    error: Option<String>,
}

#[derive(Debug)]
struct PageState {
    start_ts: f64,
    wall_time: Option<f64>,
    title: String,
    on_content_load: Option<f64>,
    on_load: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Milestone {
    ContentLoad,
    Load,
}

#[derive(Debug, Default)]
struct ArchiveBuilder {
    child_frames: FxHashSet<String>,
    top_frames: Vec<String>,
    milestones: Vec<(Milestone, f64)>,
    open: FxHashMap<String, EntryState>,
    done: Vec<EntryState>,
    /// Last `(wallTime, timestamp)` pair seen on a request.
    clock: Option<(f64, f64)>,
    /// First pair seen, for entries opened before any anchor existed.
    first_clock: Option<(f64, f64)>,
}

impl ArchiveBuilder {
    fn apply(&mut self, event: &ObservedEvent) {
        match event.method.as_str() {
            PAGE_FRAME_ATTACHED => {
                if let Some(attached) = parse::<FrameAttached>(event)
                    && attached.parent_frame_id.is_some()
                {
                    self.child_frames.insert(attached.frame_id);
                }
            }
            PAGE_FRAME_STARTED_LOADING => {
                if let Some(started) = parse::<FrameStartedLoading>(event)
                    && !self.top_frames.contains(&started.frame_id)
                {
                    self.top_frames.push(started.frame_id);
                }
            }
            PAGE_DOM_CONTENT_EVENT_FIRED => {
                if let Some(mark) = parse::<Lifecycle>(event) {
                    self.milestones.push((Milestone::ContentLoad, mark.timestamp));
                }
            }
            PAGE_LOAD_EVENT_FIRED => {
                if let Some(mark) = parse::<Lifecycle>(event) {
                    self.milestones.push((Milestone::Load, mark.timestamp));
                }
            }
            NETWORK_REQUEST_WILL_BE_SENT => {
                if let Some(sent) = parse::<RequestWillBeSent>(event) {
                    self.open_entry(sent);
                }
            }
            NETWORK_RESPONSE_RECEIVED => {
                if let Some(received) = parse::<ResponseReceived>(event)
                    && let Some(entry) = self.open.get_mut(&received.request_id)
                {
                    if received.resource_type.is_some() {
                        entry.resource_type = received.resource_type;
                    }
                    entry.response = Some(received.response);
                }
            }
            NETWORK_DATA_RECEIVED => {
                if let Some(data) = parse::<DataReceived>(event)
                    && let Some(entry) = self.open.get_mut(&data.request_id)
                {
                    entry.data_length += data.data_length as i64;
                }
            }
            NETWORK_REQUEST_SERVED_FROM_CACHE => {
                if let Some(cached) = parse::<RequestOnly>(event)
                    && let Some(entry) = self.open.get_mut(&cached.request_id)
                {
                    entry.served_from_cache = true;
                }
            }
            NETWORK_RESOURCE_CHANGED_PRIORITY => {
                if let Some(changed) = parse::<ResourceChangedPriority>(event)
                    && let Some(entry) = self.open.get_mut(&changed.request_id)
                {
                    entry.priority = Some(changed.new_priority);
                }
            }
            NETWORK_LOADING_FINISHED => {
                if let Some(finished) = parse::<LoadingFinished>(event)
                    && let Some(mut entry) = self.open.remove(&finished.request_id)
                {
                    entry.end_ts = Some(finished.timestamp);
                    entry.encoded_length = finished.encoded_data_length.map(|n| n as i64);
                    self.done.push(entry);
                }
            }
            NETWORK_LOADING_FAILED => {
                if let Some(failed) = parse::<LoadingFailed>(event)
                    && let Some(mut entry) = self.open.remove(&failed.request_id)
                {
                    entry.end_ts = Some(failed.timestamp);
                    entry.error = Some(failed.error_text.unwrap_or_default());
                    self.done.push(entry);
                }
            }
            other => trace!(method = other, "Event not used for the archive"),
        }
    }

    fn open_entry(&mut self, sent: RequestWillBeSent) {
        if let Some(wall_time) = sent.wall_time {
            self.clock = Some((wall_time, sent.timestamp));
            self.first_clock.get_or_insert((wall_time, sent.timestamp));
        }

        let redirected = sent.redirect_response.is_some();
        if let Some(redirect) = sent.redirect_response
            && let Some(mut previous) = self.open.remove(&sent.request_id)
        {
            previous.response = Some(redirect);
            previous.end_ts = Some(sent.timestamp);
            self.done.push(previous);
        }

        let wall_time = sent
            .wall_time
            .or_else(|| wall_from_anchor(self.clock, sent.timestamp));

        let entry = EntryState {
            navigation: !redirected
                && sent.resource_type.as_deref() == Some(DOCUMENT_RESOURCE),
            request_id: sent.request_id.clone(),
            frame_id: sent.frame_id,
            resource_type: sent.resource_type,
            start_ts: sent.timestamp,
            wall_time,
            request: sent.request,
            response: None,
            end_ts: None,
            data_length: 0,
            encoded_length: None,
            served_from_cache: false,
            priority: None,
            error: None,
        };

        if let Some(replaced) = self.open.insert(sent.request_id, entry) {
            trace!(request_id = %replaced.request_id, "Request reopened without redirect");
        }
    }

    fn finish(self, creator: Creator, include_bodies: bool) -> Har {
        let mut states: Vec<EntryState> = self.done;
        states.extend(self.open.into_values());
        states.sort_by(|a, b| a.start_ts.total_cmp(&b.start_ts));

        let frames = FrameTree {
            children: self.child_frames,
            top_level: self.top_frames,
            first_document: states
                .iter()
                .find(|state| state.navigation)
                .and_then(|state| state.frame_id.clone()),
        };

        let mut pages: Vec<PageState> = states
            .iter()
            .filter(|state| {
                state.navigation && frames.is_top_level(state.frame_id.as_deref())
            })
            .map(|state| PageState {
                start_ts: state.start_ts,
                wall_time: state.wall_time,
                title: state.request.url.clone(),
                on_content_load: None,
                on_load: None,
            })
            .collect();

        if pages.is_empty()
            && let Some(first) = states.iter().find(|state| state.response.is_some())
        {
            pages.push(PageState {
                start_ts: first.start_ts,
                wall_time: first.wall_time,
                title: first.request.url.clone(),
                on_content_load: None,
                on_load: None,
            });
        }

        for (milestone, ts) in self.milestones {
            let Some(index) = page_index(&pages, ts) else {
                continue;
            };
            let page = &mut pages[index];
            let offset = (ts - page.start_ts) * 1000.0;
            match milestone {
                Milestone::ContentLoad => {
                    page.on_content_load.get_or_insert(offset);
                }
                Milestone::Load => {
                    page.on_load.get_or_insert(offset);
                }
            }
        }

        let anchor = self.first_clock;
        let total = states.len();
        let entries: Vec<Entry> = states
            .into_iter()
            .filter_map(|state| {
                let pageref = page_index(&pages, state.start_ts)
                    .or((!pages.is_empty()).then_some(0))
                    .map(page_id);
                build_entry(state, pageref, anchor, include_bodies)
            })
            .collect();

        debug!(
            pages = pages.len(),
            entries = entries.len(),
            dropped = total - entries.len(),
            "Built HAR archive"
        );

        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| HarPage {
                started_date_time: format_wall_time(
                    page.wall_time.or_else(|| wall_from_anchor(anchor, page.start_ts)),
                ),
                id: page_id(index),
                title: page.title,
                page_timings: PageTimings {
                    on_content_load: page.on_content_load,
                    on_load: page.on_load,
                },
            })
            .collect();

        Har {
            log: Log {
                version: HAR_VERSION.to_string(),
                creator,
                pages,
                entries,
            },
        }
    }
}

/// Frame hierarchy as announced by page events.
struct FrameTree {
    children: FxHashSet<String>,
    top_level: Vec<String>,
    /// Frame of the first document request, used when no frame announced itself.
    first_document: Option<String>,
}

impl FrameTree {
    fn is_top_level(&self, frame_id: Option<&str>) -> bool {
        let Some(frame_id) = frame_id else {
            return false;
        };
        if self.children.contains(frame_id) {
            return false;
        }
        if self.top_level.is_empty() {
            self.first_document.as_deref() == Some(frame_id)
        } else {
            self.top_level.iter().any(|top| top == frame_id)
        }
    }
}

// ============================================================================
// Entry Conversion
// ============================================================================

fn build_entry(
    state: EntryState,
    pageref: Option<String>,
    anchor: Option<(f64, f64)>,
    include_bodies: bool,
) -> Option<Entry> {
    let Some(response) = state.response else {
        trace!(request_id = %state.request_id, "Dropping entry without response");
        return None;
    };

    let timings = timings(&response, state.start_ts, state.end_ts);
    let from_cache = if response.from_disk_cache {
        Some("disk".to_string())
    } else if state.served_from_cache {
        Some("memory".to_string())
    } else {
        None
    };
    let cached = from_cache.is_some();
    let http_version = http_version(response.protocol.as_deref());

    let body_len = response.body.as_ref().map_or(0, |body| body.len() as i64);
    let content = Content {
        size: if state.data_length > 0 {
            state.data_length
        } else {
            body_len
        },
        mime_type: response.mime_type.clone(),
        text: if include_bodies { response.body.clone() } else { None },
    };

    let request = HarRequest {
        method: state.request.method.clone(),
        url: state.request.url.clone(),
        http_version: http_version.clone(),
        cookies: Vec::new(),
        headers: har_headers(&state.request.headers),
        query_string: query_string(&state.request.url),
        post_data: state.request.post_data.as_ref().map(|text| PostData {
            mime_type: header_value(&state.request.headers, "content-type")
                .unwrap_or("application/octet-stream")
                .to_string(),
            text: text.clone(),
        }),
        headers_size: -1,
        body_size: state.request.post_data.as_ref().map_or(0, |text| text.len() as i64),
    };

    let har_response = HarResponse {
        status: response.status,
        status_text: response.status_text.clone(),
        http_version,
        cookies: Vec::new(),
        headers: har_headers(&response.headers),
        redirect_url: header_value(&response.headers, "location")
            .unwrap_or_default()
            .to_string(),
        headers_size: -1,
        body_size: if cached {
            0
        } else if state.data_length > 0 {
            state.data_length
        } else {
            -1
        },
        transfer_size: state.encoded_length,
        content,
    };

    Some(Entry {
        pageref,
        started_date_time: format_wall_time(
            state.wall_time.or_else(|| wall_from_anchor(anchor, state.start_ts)),
        ),
        time: timings.total(),
        request,
        response: har_response,
        cache: Cache::default(),
        timings,
        server_ip_address: response
            .remote_ip_address
            .as_deref()
            .map(|ip| ip.trim_start_matches('[').trim_end_matches(']').to_string()),
        connection: response.connection_id.map(|id| id.to_string()),
        priority: state.priority,
        resource_type: state.resource_type,
        from_cache,
        error: state.error,
    })
}

fn timings(response: &ResponseData, start_ts: f64, end_ts: Option<f64>) -> Timings {
    let Some(timing) = &response.timing else {
        let receive = end_ts.map_or(0.0, |end| ((end - start_ts) * 1000.0).max(0.0));
        return Timings {
            blocked: -1.0,
            dns: -1.0,
            connect: -1.0,
            send: 0.0,
            wait: 0.0,
            receive,
            ssl: -1.0,
        };
    };

    let queued = ((timing.request_time - start_ts) * 1000.0).max(0.0);
    let first_phase = [timing.dns_start, timing.connect_start, timing.send_start]
        .into_iter()
        .find(|offset| *offset >= 0.0)
        .unwrap_or(0.0);

    Timings {
        blocked: queued + first_phase,
        dns: span(timing.dns_start, timing.dns_end),
        connect: span(timing.connect_start, timing.connect_end),
        send: span(timing.send_start, timing.send_end).max(0.0),
        wait: (timing.receive_headers_end - timing.send_end).max(0.0),
        receive: end_ts.map_or(0.0, |end| {
            ((end - timing.request_time) * 1000.0 - timing.receive_headers_end).max(0.0)
        }),
        ssl: span(timing.ssl_start, timing.ssl_end),
    }
}

fn span(start: f64, end: f64) -> f64 {
    if start >= 0.0 && end >= start {
        end - start
    } else {
        -1.0
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Latest page started at or before `ts`.
fn page_index(pages: &[PageState], ts: f64) -> Option<usize> {
    pages.iter().rposition(|page| page.start_ts <= ts)
}

fn page_id(index: usize) -> String {
    format!("page_{}", index + 1)
}

fn wall_from_anchor(anchor: Option<(f64, f64)>, ts: f64) -> Option<f64> {
    anchor.map(|(wall, anchor_ts)| wall + (ts - anchor_ts))
}

/// RFC 3339 with milliseconds; the epoch when the time is unknown.
fn format_wall_time(seconds: Option<f64>) -> String {
    let millis = seconds.map_or(0, |seconds| (seconds * 1000.0).round() as i64);
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn http_version(protocol: Option<&str>) -> String {
    match protocol {
        Some(protocol) if protocol.starts_with("http/") => protocol.to_ascii_uppercase(),
        Some(protocol) => protocol.to_string(),
        None => String::new(),
    }
}

fn har_headers(headers: &Map<String, Value>) -> Vec<Header> {
    let mut out = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        let value = match value {
            Value::String(value) => value.clone(),
            other => other.to_string(),
        };
        for line in value.split('\n') {
            out.push(Header {
                name: name.clone(),
                value: line.to_string(),
            });
        }
    }
    out
}

fn header_value<'a>(headers: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
}

fn query_string(url: &str) -> Vec<QueryParam> {
    let Ok(url) = Url::parse(url) else {
        return Vec::new();
    };
    url.query_pairs()
        .map(|(name, value)| QueryParam {
            name: name.into_owned(),
            value: value.into_owned(),
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
