// dataset.rs -- Loading a repeatability dataset from disk.
//
// Layout, unchanged from the published datasets:
//   <dir>/frames/frame_<i>.pgm        grayscale frames, all the same size
//   <dir>/warps/warp_<i>_<j>.warp     one "x y" destination per source
//                                     pixel in raster order, "-1 -1" when
//                                     the pixel leaves frame j
//
// Everything is loaded and validated up front; the annealing loop never
// touches the filesystem. Failures come back as structured errors rather
// than terminating the process.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::image::Image;
use crate::warp::{WarpMap, WarpPolicy, WarpSet};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("frame list is empty")]
    NoFrames,

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },

    #[error("{path}: frame is {got_w}×{got_h}, expected {want_w}×{want_h}")]
    FrameSizeMismatch {
        path: PathBuf,
        got_w: usize,
        got_h: usize,
        want_w: usize,
        want_h: usize,
    },

    #[error("{path}: entry {index}: malformed warp coordinate")]
    MalformedWarp { path: PathBuf, index: usize },

    #[error("{path}: has {found} warp entries, expected {expected}")]
    WarpLengthMismatch {
        path: PathBuf,
        found: usize,
        expected: usize,
    },
}

/// A fully loaded training set: frames plus all pairwise warps, built under
/// a single warp policy.
#[derive(Debug)]
pub struct Dataset {
    pub frames: Vec<Image<u8>>,
    pub warps: WarpSet,
}

impl Dataset {
    /// Load the numbered frames and every ordered pairwise warp from `dir`.
    pub fn load(dir: &Path, frame_ids: &[u32], policy: WarpPolicy) -> Result<Dataset, DatasetError> {
        if frame_ids.is_empty() {
            return Err(DatasetError::NoFrames);
        }

        let mut frames: Vec<Image<u8>> = Vec::with_capacity(frame_ids.len());
        for &id in frame_ids {
            let path = dir.join("frames").join(format!("frame_{id}.pgm"));
            let frame = load_frame(&path)?;
            if let Some(first) = frames.first() {
                if frame.width() != first.width() || frame.height() != first.height() {
                    return Err(DatasetError::FrameSizeMismatch {
                        path,
                        got_w: frame.width(),
                        got_h: frame.height(),
                        want_w: first.width(),
                        want_h: first.height(),
                    });
                }
            }
            frames.push(frame);
        }

        let w = frames[0].width();
        let h = frames[0].height();
        let n = frame_ids.len();
        let mut warps = WarpSet::new(n, policy);
        for (from, &i) in frame_ids.iter().enumerate() {
            for (to, &j) in frame_ids.iter().enumerate() {
                if from == to {
                    continue;
                }
                let path = dir.join("warps").join(format!("warp_{i}_{j}.warp"));
                warps.insert(from, to, load_warp(&path, w, h, policy)?);
            }
        }

        info!(
            frames = frames.len(),
            width = w,
            height = h,
            ?policy,
            "dataset loaded",
        );

        Ok(Dataset { frames, warps })
    }
}

/// Load one grayscale frame.
fn load_frame(path: &Path) -> Result<Image<u8>, DatasetError> {
    let decoded = ::image::open(path).map_err(|source| match source {
        ::image::ImageError::IoError(source) => DatasetError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => DatasetError::Decode {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let gray = decoded.to_luma8();
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    Ok(Image::from_vec(w, h, gray.into_raw()))
}

/// Parse one warp file: `width × height` whitespace-separated "x y" pairs.
fn load_warp(
    path: &Path,
    width: usize,
    height: usize,
    policy: WarpPolicy,
) -> Result<WarpMap, DatasetError> {
    let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let expected = width * height;
    let mut raw = Vec::with_capacity(expected);
    let mut tokens = text.split_whitespace();
    loop {
        let Some(tx) = tokens.next() else { break };
        let Some(ty) = tokens.next() else {
            return Err(DatasetError::MalformedWarp {
                path: path.to_path_buf(),
                index: raw.len(),
            });
        };
        let parse = |t: &str| t.parse::<f32>().ok();
        match (parse(tx), parse(ty)) {
            (Some(x), Some(y)) => raw.push((x, y)),
            _ => {
                return Err(DatasetError::MalformedWarp {
                    path: path.to_path_buf(),
                    index: raw.len(),
                })
            }
        }
    }

    if raw.len() != expected {
        return Err(DatasetError::WarpLengthMismatch {
            path: path.to_path_buf(),
            found: raw.len(),
            expected,
        });
    }

    Ok(WarpMap::from_raw(width, height, &raw, policy))
}
