//! Low-level building blocks for custom recognition pipelines.
//!
//! These expose the correlation kernels, candidate selection, the keypoint
//! pyramid and the matching/verification stages individually. Most users
//! should prefer [`crate::Recognizer`].

pub use crate::candidate::nms::nms_3x3;
pub use crate::candidate::topk::{Peak, Ranked, TopK};
pub use crate::feature::{find_homography, match_descriptors, HomographyFit, LadderParams, RansacParams};
pub use crate::image::pyramid::ScalePyramid;
pub use crate::image::{resize_area_gray, resize_area_rgb};
pub use crate::kernel::{DefaultKernel, Kernel, ScanParams};
pub use crate::template::{match_template_gray, CorrPlan, LabHistogram};
