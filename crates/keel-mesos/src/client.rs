use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tracing::{debug, instrument, trace, warn};

use crate::MesosError;
use crate::proto::{
    AgentId, Call, Event, EventType, FrameworkId, FrameworkInfo, OfferId, ReconcileTask, TaskId,
    TaskInfo,
};
use crate::recordio::RecordIoDecoder;

const STREAM_ID_HEADER: &str = "Mesos-Stream-Id";

/// Decoded subscription events; ends when the connection drops.
pub type EventStream = BoxStream<'static, Result<Event, MesosError>>;

/// Seam between the scheduler core and the cluster manager.
///
/// Only [`subscribe`](Self::subscribe) and [`call`](Self::call) are required;
/// the typed helpers build the matching [`Call`].
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Open the event stream. Per-record decode failures surface as `Err`
    /// items without ending the stream.
    async fn subscribe(&self, info: FrameworkInfo) -> Result<EventStream, MesosError>;

    async fn call(&self, call: Call) -> Result<(), MesosError>;

    async fn launch(
        &self,
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        refuse_seconds: Option<f64>,
    ) -> Result<(), MesosError> {
        self.call(Call::launch(offer_id, tasks, refuse_seconds)).await
    }

    async fn decline(&self, offer_ids: Vec<OfferId>, refuse_seconds: Option<f64>) -> Result<(), MesosError> {
        self.call(Call::decline(offer_ids, refuse_seconds)).await
    }

    async fn kill(&self, task_id: TaskId, agent_id: Option<AgentId>) -> Result<(), MesosError> {
        self.call(Call::kill(task_id, agent_id)).await
    }

    async fn acknowledge(&self, agent_id: AgentId, task_id: TaskId, uuid: String) -> Result<(), MesosError> {
        self.call(Call::acknowledge(agent_id, task_id, uuid)).await
    }

    async fn reconcile(&self, tasks: Vec<ReconcileTask>) -> Result<(), MesosError> {
        self.call(Call::reconcile(tasks)).await
    }

    async fn revive(&self) -> Result<(), MesosError> {
        self.call(Call::revive()).await
    }

    async fn suppress(&self) -> Result<(), MesosError> {
        self.call(Call::suppress()).await
    }
}

/// Connection settings for [`HttpSchedulerClient`].
#[derive(Debug, Clone)]
pub struct SchedulerEndpoint {
    /// Base URL of the manager, e.g. `http://127.0.0.1:5050`.
    pub master: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Timeout for each non-streaming call.
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Default)]
struct Session {
    stream_id: Option<String>,
    framework_id: Option<FrameworkId>,
}

/// Scheduler client over the manager's HTTP API.
///
/// Keeps the stream id from the subscribe response and the framework id from
/// the `SUBSCRIBED` event; both are attached to every later call.
#[derive(Clone)]
pub struct HttpSchedulerClient {
    http: reqwest::Client,
    url: String,
    endpoint: SchedulerEndpoint,
    session: Arc<RwLock<Session>>,
}

impl HttpSchedulerClient {
    pub fn new(endpoint: SchedulerEndpoint) -> Result<Self, MesosError> {
        let http = reqwest::Client::builder()
            .connect_timeout(endpoint.connect_timeout)
            .tls_danger_accept_invalid_certs(endpoint.accept_invalid_certs)
            .build()?;
        let url = format!("{}/api/v1/scheduler", endpoint.master.trim_end_matches('/'));

        Ok(Self {
            http,
            url,
            endpoint,
            session: Arc::new(RwLock::new(Session::default())),
        })
    }

    pub fn framework_id(&self) -> Option<FrameworkId> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .framework_id
            .clone()
    }

    pub fn stream_id(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stream_id
            .clone()
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let req = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.endpoint.username {
            Some(user) => req.basic_auth(user, self.endpoint.password.as_ref()),
            None => req,
        }
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    #[instrument(level = "debug", skip_all, fields(url = %self.url))]
    async fn subscribe(&self, info: FrameworkInfo) -> Result<EventStream, MesosError> {
        {
            let mut s = self.session.write().unwrap_or_else(PoisonError::into_inner);
            s.stream_id = None;
            if info.id.is_some() {
                s.framework_id = info.id.clone();
            }
        }

        let resp = self.request().json(&Call::subscribe(info)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MesosError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream_id = resp
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| MesosError::Protocol(format!("missing {STREAM_ID_HEADER} header")))?;
        debug!(stream_id = %stream_id, "subscribed to event stream");
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .stream_id = Some(stream_id);

        let state = StreamState {
            body: resp.bytes_stream().boxed(),
            decoder: RecordIoDecoder::new(),
            session: Arc::clone(&self.session),
            done: false,
        };
        Ok(stream::unfold(state, StreamState::next_event).boxed())
    }

    #[instrument(level = "trace", skip_all, fields(kind = ?call.kind))]
    async fn call(&self, mut call: Call) -> Result<(), MesosError> {
        let stream_id = {
            let s = self.session.read().unwrap_or_else(PoisonError::into_inner);
            if call.framework_id.is_none() {
                call.framework_id = s.framework_id.clone();
            }
            s.stream_id.clone()
        };
        let stream_id = stream_id.ok_or(MesosError::NotSubscribed)?;

        let resp = self
            .request()
            .header(STREAM_ID_HEADER, stream_id)
            .timeout(self.endpoint.call_timeout)
            .json(&call)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(kind = ?call.kind, status = status.as_u16(), %body, "call rejected");
            return Err(MesosError::Status {
                status: status.as_u16(),
                body,
            });
        }
        trace!(kind = ?call.kind, "call accepted");
        Ok(())
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: RecordIoDecoder,
    session: Arc<RwLock<Session>>,
    done: bool,
}

impl StreamState {
    async fn next_event(mut self) -> Option<(Result<Event, MesosError>, Self)> {
        if self.done {
            return None;
        }
        loop {
            match self.decoder.next_record() {
                Ok(Some(record)) => {
                    let item = Event::decode(&record);
                    if let Ok(ev) = &item {
                        self.observe(ev);
                    }
                    return Some((item, self));
                }
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some((Err(e), self));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some((Err(e.into()), self));
                }
                None => return None,
            }
        }
    }

    fn observe(&self, ev: &Event) {
        if ev.kind != EventType::Subscribed {
            return;
        }
        if let Some(sub) = &ev.subscribed {
            self.session
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .framework_id = Some(sub.framework_id.clone());
        }
    }
}
