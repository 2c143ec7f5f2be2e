use std::sync::Arc;

use crossbeam_channel::Sender;
use vista_geom::RegionOrigin;

use crate::buffer_pool::{BuildBufferPool, BuildBuffers, PooledBuffers};
use crate::error::TaskError;
use crate::proto::{BuildKind, FinishOutcome, ProtoRegionSlot};

const VERTEX_STRIDE: usize = 28;
const QUAD_STRIDE: usize = VERTEX_STRIDE * 4;

/// Produces region geometry on a worker thread.
///
/// Vertices are 28 bytes with the position as three little-endian `f32` relative to the
/// region origin in the first 12 bytes. Quads are four consecutive vertices.
pub trait RegionMesher: Send + Sync {
    fn build(&self, origin: RegionOrigin, out: &mut BuildBuffers) -> Result<(), TaskError>;
}

/// One queued build or resort for a region.
pub struct RegionBuildJob {
    pub origin: RegionOrigin,
    pub slot: Arc<ProtoRegionSlot>,
    /// Camera position relative to the region origin, for translucent ordering.
    pub camera: [f32; 3],
    /// Current translucent vertices, used when the slot claims a resort.
    pub resort_source: Option<Vec<u8>>,
    /// Ticket of the build `resort_source` was taken from.
    pub source_ticket: u64,
}

/// Result handed back to the render thread.
#[derive(Debug)]
pub enum RegionBuildOutput {
    Built {
        origin: RegionOrigin,
        ticket: u64,
        buffers: PooledBuffers,
    },
    /// Only valid while the region still shows the build `source_ticket`.
    Resorted {
        origin: RegionOrigin,
        ticket: u64,
        source_ticket: u64,
        translucent: Vec<u8>,
    },
    Abandoned {
        origin: RegionOrigin,
        ticket: u64,
        reason: TaskError,
    },
}

impl RegionBuildOutput {
    pub fn origin(&self) -> RegionOrigin {
        match self {
            RegionBuildOutput::Built { origin, .. }
            | RegionBuildOutput::Resorted { origin, .. }
            | RegionBuildOutput::Abandoned { origin, .. } => *origin,
        }
    }
}

#[inline]
fn read_f32(bytes: &[u8], at: usize) -> f32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    f32::from_le_bytes(word)
}

fn quad_distance_sq(quad: &[u8], camera: [f32; 3]) -> f32 {
    let mut center = [0.0f32; 3];
    for v in 0..4 {
        let base = v * VERTEX_STRIDE;
        for (axis, c) in center.iter_mut().enumerate() {
            *c += read_f32(quad, base + axis * 4);
        }
    }
    center
        .iter()
        .zip(camera)
        .map(|(c, cam)| {
            let d = c * 0.25 - cam;
            d * d
        })
        .sum()
}

/// Reorders quads back to front from `camera`. A trailing partial quad is left in place.
pub fn sort_translucent_quads(bytes: &mut [u8], camera: [f32; 3]) {
    let quad_count = bytes.len() / QUAD_STRIDE;
    if quad_count < 2 {
        return;
    }
    let mut keyed: Vec<(f32, usize)> = bytes
        .chunks_exact(QUAD_STRIDE)
        .enumerate()
        .map(|(i, quad)| (quad_distance_sq(quad, camera), i))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    if keyed.iter().enumerate().all(|(pos, &(_, i))| pos == i) {
        return;
    }
    let sorted: Vec<u8> = keyed
        .iter()
        .flat_map(|&(_, i)| bytes[i * QUAD_STRIDE..(i + 1) * QUAD_STRIDE].iter().copied())
        .collect();
    bytes[..sorted.len()].copy_from_slice(&sorted);
}

/// Runs whatever work `job.slot` has queued and publishes the result unless it was superseded.
///
/// Exhaustion and mesher failures are both published as [`RegionBuildOutput::Abandoned`] so
/// the render thread can flag the region again; only mesher failures also return an error.
pub fn run_region_build(
    job: RegionBuildJob,
    mesher: &dyn RegionMesher,
    pool: &Arc<BuildBufferPool>,
    tx: &Sender<RegionBuildOutput>,
) -> Result<(), TaskError> {
    let RegionBuildJob {
        origin,
        slot,
        camera,
        resort_source,
        source_ticket,
    } = job;
    let Some((kind, ticket)) = slot.begin() else {
        log::trace!(target: "executor", "nothing queued for {:?}", origin);
        return Ok(());
    };

    let output = match (kind, resort_source) {
        (BuildKind::ResortOnly, Some(mut translucent)) => {
            sort_translucent_quads(&mut translucent, camera);
            RegionBuildOutput::Resorted {
                origin,
                ticket,
                source_ticket,
                translucent,
            }
        }
        (BuildKind::ResortOnly, None) => {
            slot.finish(ticket);
            return Ok(());
        }
        (BuildKind::Full, _) => {
            let mut buffers = match pool.acquire() {
                Ok(b) => b,
                Err(reason) => {
                    slot.abandon(ticket);
                    log::warn!(target: "executor", "build of {:?} abandoned: {}", origin, reason);
                    let _ = tx.send(RegionBuildOutput::Abandoned {
                        origin,
                        ticket,
                        reason,
                    });
                    return Ok(());
                }
            };
            if let Err(err) = mesher.build(origin, &mut buffers) {
                slot.abandon(ticket);
                let _ = tx.send(RegionBuildOutput::Abandoned {
                    origin,
                    ticket,
                    reason: err.clone(),
                });
                return Err(err);
            }
            sort_translucent_quads(&mut buffers.translucent, camera);
            RegionBuildOutput::Built {
                origin,
                ticket,
                buffers,
            }
        }
    };

    match slot.finish(ticket) {
        FinishOutcome::Completed => {
            let _ = tx.send(output);
        }
        outcome => {
            log::trace!(target: "executor", "discarding output for {:?}: {:?}", origin, outcome);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_at(z: f32) -> Vec<u8> {
        let mut out = Vec::with_capacity(QUAD_STRIDE);
        for _ in 0..4 {
            for c in [0.0f32, 0.0, z] {
                out.extend_from_slice(&c.to_le_bytes());
            }
            out.extend_from_slice(&[0u8; VERTEX_STRIDE - 12]);
        }
        out
    }

    fn quad_z(bytes: &[u8], quad: usize) -> f32 {
        read_f32(bytes, quad * QUAD_STRIDE + 8)
    }

    #[test]
    fn quads_sort_back_to_front() {
        let mut bytes = Vec::new();
        for z in [1.0, 9.0, 4.0] {
            bytes.extend(quad_at(z));
        }
        sort_translucent_quads(&mut bytes, [0.0, 0.0, 0.0]);
        assert_eq!(quad_z(&bytes, 0), 9.0);
        assert_eq!(quad_z(&bytes, 1), 4.0);
        assert_eq!(quad_z(&bytes, 2), 1.0);
    }

    #[test]
    fn trailing_partial_quad_is_untouched() {
        let mut bytes = quad_at(1.0);
        bytes.extend(quad_at(5.0));
        bytes.extend_from_slice(&[7u8; 10]);
        sort_translucent_quads(&mut bytes, [0.0, 0.0, 0.0]);
        assert_eq!(quad_z(&bytes, 0), 5.0);
        assert_eq!(&bytes[bytes.len() - 10..], &[7u8; 10]);
    }
}
