//! IVF-PQ training for large chunk tables.
//!
//! Small corpora are searched exactly (flat cosine scan). Once the table reaches
//! the configured row threshold an IVF-PQ index is trained over `vector`.

use anyhow::Result;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{Connection, DistanceType};
use tracing::info;

use crate::schema::CHUNKS_TABLE;

pub const VECTOR_INDEX_NAME: &str = "chunks_vector_ivfpq";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
    pub nbits: usize,
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
    // ~sqrt(N) partitions, but keep enough rows per centroid to train on.
    let sqrt_n = (total_rows as f64).sqrt() as usize;
    let nlist = sqrt_n.min(total_rows / 40).clamp(1, 65536);
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = (1..=preferred).rev().find(|m| dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m, nbits: 8 }
}

pub async fn build_ivfpq_index(conn: &Connection, params: &IvfPqParams) -> Result<()> {
    let table = conn.open_table(CHUNKS_TABLE).execute().await?;
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(u32::try_from(params.nlist)?)
                    .num_sub_vectors(u32::try_from(params.m)?),
            ),
        )
        .name(VECTOR_INDEX_NAME.to_string())
        .execute()
        .await?;
    info!(nlist = params.nlist, m = params.m, "Trained IVF-PQ index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::compute_ivfpq_params;

    #[test]
    fn sub_vectors_divide_dimension() {
        for dim in [384, 768, 1024, 100] {
            let p = compute_ivfpq_params(10_000, dim);
            assert_eq!(dim % p.m, 0, "dim {dim} m {}", p.m);
        }
    }

    #[test]
    fn partitions_scale_with_rows() {
        assert_eq!(compute_ivfpq_params(10_000, 384).nlist, 100);
        assert_eq!(compute_ivfpq_params(4_096, 384).nlist, 64);
        assert_eq!(compute_ivfpq_params(10, 384).nlist, 1);
    }
}
