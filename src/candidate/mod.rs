//! Candidate selection and pruning utilities.
//!
//! Shared by the correlation scan (best placements) and the keypoint
//! detector (strongest corners per pyramid level).

pub(crate) mod nms;
pub(crate) mod topk;
