use crate::error::Result;
use crate::persistence::{Codec, PersistenceManager};
use crate::protocol::message::{Reply, Request, SaveOptions};
use crate::store::SharedStore;
use crate::utils::metrics::{Metrics, Timer};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Routes authenticated requests to the shared store and the persistence layer.
///
/// Cloning is cheap; every connection task holds its own clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<SharedStore>,
    persistence: Arc<PersistenceManager>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SharedStore>,
        persistence: Arc<PersistenceManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            persistence,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    /// Execute one request.
    ///
    /// Mutations with save options resolve the codec first, so an unknown
    /// codec fails before the store changes. A save that fails after the
    /// mutation reports the error; the mutation itself stays applied.
    #[instrument(skip(self, request), fields(op = get_opcode(&request)))]
    pub async fn dispatch(&self, request: Request) -> Result<Reply> {
        let _timer = Timer::start(get_opcode(&request));

        match request {
            Request::Set { route, value, save } => {
                let codec = resolve(save.as_ref())?;
                let previous = self.store.set(&route, value.clone())?;
                self.persist(save.as_ref(), codec).await?;
                Ok(Reply::Stored { value, previous })
            }
            Request::Get { route } => Ok(Reply::Value(self.store.get(&route)?)),
            Request::Delete { route, save } => {
                let codec = resolve(save.as_ref())?;
                self.store.delete(&route)?;
                self.persist(save.as_ref(), codec).await?;
                Ok(Reply::Removed)
            }
            Request::Drop { route, save } => {
                let codec = resolve(save.as_ref())?;
                self.store.drop_route(&route)?;
                self.persist(save.as_ref(), codec).await?;
                Ok(Reply::Removed)
            }
            Request::All { route: None } => Ok(Reply::Snapshot(self.store.all()?)),
            Request::All { route: Some(route) } => {
                Ok(Reply::Snapshot(self.store.subtree(&route)?))
            }
            Request::Save(options) => {
                let codec = Codec::from_name(&options.codec)?;
                let bytes = self.save_with(&options, codec).await?;
                Ok(Reply::Saved { bytes })
            }
            Request::Ping => Ok(Reply::Pong),
        }
    }

    async fn persist(&self, save: Option<&SaveOptions>, codec: Option<Codec>) -> Result<()> {
        if let (Some(options), Some(codec)) = (save, codec) {
            self.save_with(options, codec).await?;
        }
        Ok(())
    }

    async fn save_with(&self, options: &SaveOptions, codec: Codec) -> Result<u64> {
        // copy under the read lock, encode and write without it
        let snapshot = self.store.all()?;
        let report = self
            .persistence
            .save(&snapshot, codec, &options.path, options.threadsafe)
            .await?;
        self.metrics.save_completed();
        debug!(path = %report.path.display(), bytes = report.bytes, "Save request completed");
        Ok(report.bytes as u64)
    }
}

fn resolve(save: Option<&SaveOptions>) -> Result<Option<Codec>> {
    save.map(|options| Codec::from_name(&options.codec))
        .transpose()
}

/// Operation name for logs.
#[inline]
pub fn get_opcode(request: &Request) -> &'static str {
    match request {
        Request::Set { .. } => "SET",
        Request::Get { .. } => "GET",
        Request::Delete { .. } => "DELETE",
        Request::Drop { .. } => "DROP",
        Request::All { .. } => "ALL",
        Request::Save(_) => "SAVE",
        Request::Ping => "PING",
    }
}
