//! Many targets against one base.

use std::borrow::Cow;
use std::path::Path;

use ::image::DynamicImage;

use crate::image::io::{decode_image, load_image};
use crate::recognize::{BaseRef, MatchResult, Recognizer};
use crate::trace::{trace_span, trace_warn};
use crate::util::IconMatchResult;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A target in any of the forms callers hold it.
#[derive(Clone, Copy, Debug)]
pub enum Target<'t> {
    Image(&'t DynamicImage),
    /// Encoded image bytes.
    Bytes(&'t [u8]),
    Path(&'t Path),
}

impl<'t> Target<'t> {
    /// File name for path targets.
    pub fn name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Self::Image(_) | Self::Bytes(_) => None,
        }
    }

    pub fn decode(&self) -> IconMatchResult<Cow<'t, DynamicImage>> {
        match *self {
            Self::Image(image) => Ok(Cow::Borrowed(image)),
            Self::Bytes(bytes) => decode_image(bytes).map(Cow::Owned),
            Self::Path(path) => load_image(path).map(Cow::Owned),
        }
    }
}

impl<'a> Recognizer<'a> {
    /// Decodes `target` and recognizes it against `base`.
    pub fn recognize_target(&self, base: BaseRef<'_>, target: Target<'_>) -> IconMatchResult<MatchResult> {
        let image = target.decode()?;
        self.recognize(base, &image)
            .map(|result| result.with_candidate_name(target.name()))
    }

    /// Recognizes every target against `base`.
    ///
    /// The output has one result per target, in input order. A target that
    /// fails (undecodable, zero area) yields a zero-confidence result with an
    /// error tag and does not affect the others; if the base itself cannot
    /// be prepared, every entry carries that error.
    pub fn batch_recognize(&self, base: BaseRef<'_>, targets: &[Target<'_>]) -> Vec<MatchResult> {
        let base_id = base.label();
        let _span = trace_span!("batch_recognize", base = base_id.as_str(), targets = targets.len())
            .entered();
        let mode = self.config().mode;
        let threshold = self.config().threshold;

        let prepared = match self.prepare_base(base) {
            Ok(prepared) => prepared,
            Err(err) => {
                trace_warn!("batch_base_failed", base = base_id.as_str(), reason = err.to_string().as_str());
                return targets
                    .iter()
                    .map(|t| MatchResult::failed(base_id.clone(), mode, &err).with_candidate_name(t.name()))
                    .collect();
            }
        };

        let run = |target: &Target<'_>| {
            let scored = target.decode().and_then(|image| {
                let prepared_target = self.prepare_target(&image)?;
                self.compare(base_id.clone(), &prepared, &prepared_target, threshold)
            });
            match scored {
                Ok(result) => result.with_candidate_name(target.name()),
                Err(err) => {
                    trace_warn!(
                        "batch_target_failed",
                        base = base_id.as_str(),
                        reason = err.to_string().as_str()
                    );
                    MatchResult::failed(base_id.clone(), mode, &err).with_candidate_name(target.name())
                }
            }
        };

        #[cfg(feature = "rayon")]
        let results: Vec<MatchResult> = targets.par_iter().map(run).collect();

        #[cfg(not(feature = "rayon"))]
        let results: Vec<MatchResult> = targets.iter().map(run).collect();

        results
    }
}
