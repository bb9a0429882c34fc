//! Off-thread asset loading with a completion channel.
//!
//! Every request is fetched and decoded independently; the owner of the
//! scene drains finished loads with [`PendingAssets::poll`] between frames.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use thiserror::Error;

use crate::gltf_loader;
use crate::model::ModelAsset;
use crate::scene::SceneDescription;

/// The slot in the scene an asset fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Character,
    Draggable,
    Ball,
    Background,
}

impl AssetKind {
    pub const MODELS: [AssetKind; 3] = [AssetKind::Character, AssetKind::Draggable, AssetKind::Ball];

    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Character => "character",
            AssetKind::Draggable => "draggable",
            AssetKind::Ball => "ball",
            AssetKind::Background => "background",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },
    #[error("failed to decode glTF bundle {path}: {source}")]
    Gltf {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("glTF bundle {path} contains no triangle meshes")]
    Empty { path: String },
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// One asset to fetch. `location` is a filesystem path natively and a URL in
/// the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub kind: AssetKind,
    pub location: String,
}

/// Decoded RGBA8 image, used for the background and for model textures.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Decodes a PNG or JPEG into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }

    /// A copy shrunk so neither side exceeds `max`, keeping the aspect
    /// ratio. `None` when the image already fits.
    pub fn fit_within(&self, max: u32) -> Option<Self> {
        if max == 0 || (self.width <= max && self.height <= max) {
            return None;
        }
        let scale = max as f32 / self.width.max(self.height) as f32;
        let width = ((self.width as f32 * scale).round() as u32).clamp(1, max);
        let height = ((self.height as f32 * scale).round() as u32).clamp(1, max);
        let source = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())?;
        let resized =
            image::imageops::resize(&source, width, height, image::imageops::FilterType::Triangle);
        Some(Self {
            width,
            height,
            pixels: resized.into_raw(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum LoadedAsset {
    Model(Arc<ModelAsset>),
    Background(Arc<ImageData>),
}

/// Result of one request, success or failure.
#[derive(Debug)]
pub struct LoadOutcome {
    pub kind: AssetKind,
    pub location: String,
    pub result: Result<LoadedAsset, AssetError>,
}

/// Joins `path` onto `root` with a single `/`. Absolute paths and URLs pass
/// through untouched.
pub fn resolve(root: &str, path: &str) -> String {
    if root.is_empty() || path.starts_with('/') || path.contains("://") {
        return path.to_string();
    }
    format!("{}/{}", root.trim_end_matches('/'), path)
}

/// The four requests a scene needs, resolved against `root`.
pub fn requests_for(scene: &SceneDescription, root: &str) -> Vec<AssetRequest> {
    let mut requests = vec![
        AssetRequest {
            kind: AssetKind::Character,
            location: resolve(root, &scene.character.path),
        },
        AssetRequest {
            kind: AssetKind::Draggable,
            location: resolve(root, &scene.draggable.path),
        },
        AssetRequest {
            kind: AssetKind::Ball,
            location: resolve(root, &scene.ball.path),
        },
    ];
    if let Some(background) = &scene.background {
        requests.push(AssetRequest {
            kind: AssetKind::Background,
            location: resolve(root, background),
        });
    }
    requests
}

/// Turns fetched bytes into the asset `kind` expects.
pub fn decode(kind: AssetKind, location: &str, bytes: &[u8]) -> Result<LoadedAsset, AssetError> {
    match kind {
        AssetKind::Background => decode_background(location, bytes)
            .map(|image| LoadedAsset::Background(Arc::new(image))),
        _ => gltf_loader::load_model(location, bytes)
            .map(|model| LoadedAsset::Model(Arc::new(model))),
    }
}

pub fn decode_background(location: &str, bytes: &[u8]) -> Result<ImageData, AssetError> {
    ImageData::decode(bytes).map_err(|source| AssetError::Image {
        path: location.to_string(),
        source,
    })
}

/// Loads still in flight.
#[derive(Debug)]
pub struct PendingAssets {
    receiver: Receiver<LoadOutcome>,
    outstanding: usize,
}

impl PendingAssets {
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_finished(&self) -> bool {
        self.outstanding == 0
    }

    /// Collects every load that has completed since the last call, without
    /// blocking.
    pub fn poll(&mut self) -> Vec<LoadOutcome> {
        let mut finished = Vec::new();
        while self.outstanding > 0 {
            match self.receiver.try_recv() {
                Ok(outcome) => {
                    self.outstanding -= 1;
                    finished.push(outcome);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("{} asset load(s) never reported back", self.outstanding);
                    self.outstanding = 0;
                }
            }
        }
        finished
    }

    /// Blocks until every load has reported. Never call this on a browser's
    /// main thread: the fetches it waits for need that thread to progress.
    pub fn wait_all(mut self) -> Vec<LoadOutcome> {
        let mut finished = Vec::with_capacity(self.outstanding);
        while self.outstanding > 0 {
            match self.receiver.recv() {
                Ok(outcome) => {
                    self.outstanding -= 1;
                    finished.push(outcome);
                }
                Err(_) => break,
            }
        }
        finished
    }
}

pub struct AssetLoader;

impl AssetLoader {
    /// Starts every request concurrently.
    pub fn spawn(requests: Vec<AssetRequest>) -> PendingAssets {
        let (sender, receiver) = mpsc::channel();
        let outstanding = requests.len();
        for request in requests {
            log::debug!("loading {} from {}", request.kind, request.location);
            Self::start(request, sender.clone());
        }
        PendingAssets {
            receiver,
            outstanding,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn start(request: AssetRequest, sender: Sender<LoadOutcome>) {
        let AssetRequest { kind, location } = request;
        let fallback = sender.clone();
        let worker_location = location.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("load-{kind}"))
            .spawn(move || {
                let result = std::fs::read(&worker_location)
                    .map_err(|source| AssetError::Io {
                        path: worker_location.clone(),
                        source,
                    })
                    .and_then(|bytes| decode(kind, &worker_location, &bytes));
                let _ = sender.send(LoadOutcome {
                    kind,
                    location: worker_location,
                    result,
                });
            });
        if let Err(source) = spawned {
            let _ = fallback.send(LoadOutcome {
                kind,
                result: Err(AssetError::Io {
                    path: location.clone(),
                    source,
                }),
                location,
            });
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn start(request: AssetRequest, sender: Sender<LoadOutcome>) {
        let AssetRequest { kind, location } = request;
        wasm_bindgen_futures::spawn_local(async move {
            let result = fetch_bytes(&location)
                .await
                .and_then(|bytes| decode(kind, &location, &bytes));
            let _ = sender.send(LoadOutcome {
                kind,
                location,
                result,
            });
        });
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, AssetError> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let fetch_error = |message: String| AssetError::Fetch {
        path: url.to_string(),
        message,
    };
    let window = web_sys::window().ok_or_else(|| fetch_error("no window".to_string()))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| fetch_error(format!("{err:?}")))?;
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|_| fetch_error("fetch did not yield a Response".to_string()))?;
    if !response.ok() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }
    let body = response
        .array_buffer()
        .map_err(|err| fetch_error(format!("{err:?}")))?;
    let buffer = JsFuture::from(body)
        .await
        .map_err(|err| fetch_error(format!("{err:?}")))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}
