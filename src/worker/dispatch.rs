use std::collections::HashMap;
use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use geojson::Feature;
use tracing::{debug, warn};

use crate::encode::GeoJsonTileResult;
use crate::error::{Result, TilerError};
use crate::options::LoadDataParams;
use crate::tiler::TileCoord;
use crate::worker::coalesce::{LoadDataCallback, LoadDataOutcome};
use crate::worker::source::{GeoJsonWorkerSource, LoadDataResult};

/// Identifies one source of one map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pub map_id: String,
    pub source_id: String,
}

impl SourceKey {
    pub fn new(map_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.map_id, self.source_id)
    }
}

pub type Reply<T> = Sender<Result<T>>;

/// Inbound messages handled by a [`Worker`].
#[derive(Debug)]
pub enum WorkerRequest {
    LoadData {
        key: SourceKey,
        params: Box<LoadDataParams>,
        reply: Reply<LoadDataOutcome<LoadDataResult>>,
    },
    Coalesce {
        key: SourceKey,
    },
    LoadTile {
        key: SourceKey,
        coord: TileCoord,
        reply: Reply<Option<GeoJsonTileResult>>,
    },
    GetClusters {
        key: SourceKey,
        bbox: [f64; 4],
        zoom: u8,
        reply: Reply<Vec<Feature>>,
    },
    GetClusterExpansionZoom {
        key: SourceKey,
        cluster_id: u64,
        reply: Reply<u8>,
    },
    GetClusterChildren {
        key: SourceKey,
        cluster_id: u64,
        reply: Reply<Vec<Feature>>,
    },
    GetClusterLeaves {
        key: SourceKey,
        cluster_id: u64,
        limit: usize,
        offset: usize,
        reply: Reply<Vec<Feature>>,
    },
    RemoveSource {
        key: SourceKey,
    },
}

/// Routes requests to per-source state. Sources never share anything.
#[derive(Debug, Default)]
pub struct Worker {
    sources: HashMap<SourceKey, GeoJsonWorkerSource>,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source(&self, key: &SourceKey) -> Option<&GeoJsonWorkerSource> {
        self.sources.get(key)
    }

    /// The source for `key`, created empty on first use.
    pub fn source_mut(&mut self, key: &SourceKey) -> &mut GeoJsonWorkerSource {
        self.sources
            .entry(key.clone())
            .or_insert_with(|| GeoJsonWorkerSource::new(key.source_id.clone()))
    }

    fn existing(&self, key: &SourceKey) -> Result<&GeoJsonWorkerSource> {
        self.sources
            .get(key)
            .ok_or_else(|| TilerError::invalid(format!("unknown source {key}")))
    }

    pub fn handle(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::LoadData { key, params, reply } => {
                let callback: LoadDataCallback<LoadDataResult> = Box::new(move |result| {
                    let _ = reply.send(result);
                });
                self.source_mut(&key).load_data(*params, callback);
            }
            WorkerRequest::Coalesce { key } => {
                if let Some(source) = self.sources.get_mut(&key) {
                    source.coalesce();
                }
            }
            WorkerRequest::LoadTile { key, coord, reply } => {
                let result = match self.sources.get_mut(&key) {
                    Some(source) => source.load_tile(coord),
                    None => Ok(None),
                };
                let _ = reply.send(result);
            }
            WorkerRequest::GetClusters {
                key,
                bbox,
                zoom,
                reply,
            } => {
                let result = self
                    .existing(&key)
                    .and_then(|source| source.get_clusters(bbox, zoom));
                let _ = reply.send(result);
            }
            WorkerRequest::GetClusterExpansionZoom {
                key,
                cluster_id,
                reply,
            } => {
                let result = self
                    .existing(&key)
                    .and_then(|source| source.get_cluster_expansion_zoom(cluster_id));
                let _ = reply.send(result);
            }
            WorkerRequest::GetClusterChildren {
                key,
                cluster_id,
                reply,
            } => {
                let result = self
                    .existing(&key)
                    .and_then(|source| source.get_cluster_children(cluster_id));
                let _ = reply.send(result);
            }
            WorkerRequest::GetClusterLeaves {
                key,
                cluster_id,
                limit,
                offset,
                reply,
            } => {
                let result = self
                    .existing(&key)
                    .and_then(|source| source.get_cluster_leaves(cluster_id, limit, offset));
                let _ = reply.send(result);
            }
            WorkerRequest::RemoveSource { key } => {
                if let Some(mut source) = self.sources.remove(&key) {
                    source.remove_source();
                    debug!(source = %key, "removed source");
                }
            }
        }
    }

    /// Handles requests until every sender is dropped.
    pub fn run(mut self, requests: Receiver<WorkerRequest>) {
        for request in requests {
            self.handle(request);
        }
        debug!(sources = self.sources.len(), "worker stopped");
    }
}

/// Foreground side of a worker running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle {
    sender: Sender<WorkerRequest>,
    thread: JoinHandle<()>,
}

/// Starts a [`Worker`] on a dedicated thread.
pub fn spawn_worker(name: &str) -> io::Result<WorkerHandle> {
    let (sender, receiver) = unbounded();
    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || Worker::new().run(receiver))?;
    Ok(WorkerHandle { sender, thread })
}

fn disconnected() -> TilerError {
    TilerError::invalid("worker is no longer running")
}

impl WorkerHandle {
    pub fn send(&self, request: WorkerRequest) -> Result<()> {
        self.sender.send(request).map_err(|_| disconnected())
    }

    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> WorkerRequest) -> Result<T> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(build(reply))?;
        response.recv().map_err(|_| disconnected())?
    }

    /// Submits a load. The returned receiver resolves once the load was
    /// processed or abandoned.
    pub fn load_data(
        &self,
        key: SourceKey,
        params: LoadDataParams,
    ) -> Result<Receiver<Result<LoadDataOutcome<LoadDataResult>>>> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(WorkerRequest::LoadData {
            key,
            params: Box::new(params),
            reply,
        })?;
        Ok(response)
    }

    pub fn coalesce(&self, key: SourceKey) -> Result<()> {
        self.send(WorkerRequest::Coalesce { key })
    }

    pub fn load_tile(&self, key: SourceKey, coord: TileCoord) -> Result<Option<GeoJsonTileResult>> {
        self.call(|reply| WorkerRequest::LoadTile { key, coord, reply })
    }

    pub fn get_clusters(&self, key: SourceKey, bbox: [f64; 4], zoom: u8) -> Result<Vec<Feature>> {
        self.call(|reply| WorkerRequest::GetClusters {
            key,
            bbox,
            zoom,
            reply,
        })
    }

    pub fn get_cluster_expansion_zoom(&self, key: SourceKey, cluster_id: u64) -> Result<u8> {
        self.call(|reply| WorkerRequest::GetClusterExpansionZoom {
            key,
            cluster_id,
            reply,
        })
    }

    pub fn get_cluster_children(&self, key: SourceKey, cluster_id: u64) -> Result<Vec<Feature>> {
        self.call(|reply| WorkerRequest::GetClusterChildren {
            key,
            cluster_id,
            reply,
        })
    }

    pub fn get_cluster_leaves(
        &self,
        key: SourceKey,
        cluster_id: u64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Feature>> {
        self.call(|reply| WorkerRequest::GetClusterLeaves {
            key,
            cluster_id,
            limit,
            offset,
            reply,
        })
    }

    pub fn remove_source(&self, key: SourceKey) -> Result<()> {
        self.send(WorkerRequest::RemoveSource { key })
    }

    /// Closes the request channel and waits for queued requests to finish.
    pub fn shutdown(self) {
        drop(self.sender);
        if self.thread.join().is_err() {
            warn!("worker thread panicked");
        }
    }
}
