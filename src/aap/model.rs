//! Model-number → product lookup and capability predicates.
//!
//! A metadata frame carries a model-number string (e.g. `"A2699"`), not a
//! product id; the lookup here is keyed by that string rather than by the
//! numeric `product_id` a BLE manufacturer-data TLV would carry, since that
//! is what the peer actually reports at runtime.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Model {
   AirPods1,
   AirPods2,
   AirPods3,
   AirPods4,
   AirPods4Anc,
   AirPodsPro1,
   AirPodsPro2,
   AirPodsMax,
   PowerbeatsPro,
   BeatsFitPro,
   BeatsStudioBuds,
   BeatsStudioBudsPlus,
   Unknown,
}

struct ModelInfo {
   model: Model,
   supports_anc: bool,
   supports_adaptive: bool,
   is_headphones: bool,
}

const TABLE: &[(&str, ModelInfo)] = &[
   ("A1523", ModelInfo { model: Model::AirPods1, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A1722", ModelInfo { model: Model::AirPods1, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A2031", ModelInfo { model: Model::AirPods2, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A2032", ModelInfo { model: Model::AirPods2, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A2564", ModelInfo { model: Model::AirPods3, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A2565", ModelInfo { model: Model::AirPods3, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A2566", ModelInfo { model: Model::AirPods3, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A3056", ModelInfo { model: Model::AirPods4, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A3057", ModelInfo { model: Model::AirPods4, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A3058", ModelInfo { model: Model::AirPods4Anc, supports_anc: true, supports_adaptive: true, is_headphones: false }),
   ("A3059", ModelInfo { model: Model::AirPods4Anc, supports_anc: true, supports_adaptive: true, is_headphones: false }),
   ("A2083", ModelInfo { model: Model::AirPodsPro1, supports_anc: true, supports_adaptive: false, is_headphones: false }),
   ("A2084", ModelInfo { model: Model::AirPodsPro1, supports_anc: true, supports_adaptive: false, is_headphones: false }),
   ("A2699", ModelInfo { model: Model::AirPodsPro2, supports_anc: true, supports_adaptive: true, is_headphones: false }),
   ("A2700", ModelInfo { model: Model::AirPodsPro2, supports_anc: true, supports_adaptive: true, is_headphones: false }),
   ("A3047", ModelInfo { model: Model::AirPodsPro2, supports_anc: true, supports_adaptive: true, is_headphones: false }),
   ("A3048", ModelInfo { model: Model::AirPodsPro2, supports_anc: true, supports_adaptive: true, is_headphones: false }),
   ("A2096", ModelInfo { model: Model::AirPodsMax, supports_anc: true, supports_adaptive: false, is_headphones: true }),
   ("A2618", ModelInfo { model: Model::PowerbeatsPro, supports_anc: false, supports_adaptive: false, is_headphones: false }),
   ("A2577", ModelInfo { model: Model::BeatsFitPro, supports_anc: true, supports_adaptive: false, is_headphones: false }),
   ("A2512", ModelInfo { model: Model::BeatsStudioBuds, supports_anc: true, supports_adaptive: false, is_headphones: false }),
   ("A3028", ModelInfo { model: Model::BeatsStudioBudsPlus, supports_anc: true, supports_adaptive: false, is_headphones: false }),
];

/// Resolves a model-number string (case-insensitive) to a `Model` and its
/// derived capability predicates. Unmatched strings resolve to
/// `Model::Unknown`, which is a permitted value, not an error.
pub fn resolve(model_number: &str) -> (Model, bool, bool, bool) {
   let needle = model_number.trim().to_ascii_uppercase();
   for (number, info) in TABLE {
      if *number == needle {
         return (info.model, info.supports_anc, info.supports_adaptive, info.is_headphones);
      }
   }
   (Model::Unknown, false, false, false)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn s6_model_number_to_pro2() {
      let (model, anc, adaptive, headphones) = resolve("A2699");
      assert_eq!(model, Model::AirPodsPro2);
      assert!(anc);
      assert!(adaptive);
      assert!(!headphones);
   }

   #[test]
   fn unknown_model_number_is_not_an_error() {
      let (model, anc, adaptive, headphones) = resolve("ZZZZ");
      assert_eq!(model, Model::Unknown);
      assert!(!anc);
      assert!(!adaptive);
      assert!(!headphones);
   }

   #[test]
   fn lookup_is_case_insensitive() {
      let (model, ..) = resolve("a2096");
      assert_eq!(model, Model::AirPodsMax);
   }
}
