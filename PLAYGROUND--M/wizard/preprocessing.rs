use std::{fmt, str::FromStr};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::WizardError;

/// Smallest accepted training share, in percent.
pub const MIN_TRAIN_SPLIT: u8 = 50;
/// Largest accepted training share, in percent.
pub const MAX_TRAIN_SPLIT: u8 = 95;

/// How missing cells are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingValueStrategy {
    /// Column mean.
    #[default]
    Mean,
    /// Column median.
    Median,
    /// Drop affected rows.
    Drop,
    /// Carry the previous value forward.
    Forward,
}

/// Feature scaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMethod {
    /// Zero mean, unit variance.
    #[default]
    Standardize,
    /// Min-max into [0, 1].
    Normalize,
    /// Median/IQR scaling.
    Robust,
    /// Leave values as-is.
    None,
}

/// Categorical encoding method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncodingMethod {
    /// One column per category.
    #[default]
    #[serde(rename = "onehot")]
    OneHot,
    /// Integer labels.
    #[serde(rename = "label")]
    Label,
    /// Target mean encoding.
    #[serde(rename = "target")]
    Target,
}

macro_rules! wire_names {
    ($ty:ty, $field:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire name of the option value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = WizardError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($name => Ok($variant),)+
                    other => Err(WizardError::validation(format!(
                        "unknown {} value: {other}",
                        $field
                    ))),
                }
            }
        }
    };
}

wire_names!(MissingValueStrategy, "handleMissing", {
    MissingValueStrategy::Mean => "mean",
    MissingValueStrategy::Median => "median",
    MissingValueStrategy::Drop => "drop",
    MissingValueStrategy::Forward => "forward",
});

wire_names!(ScalingMethod, "scaling", {
    ScalingMethod::Standardize => "standardize",
    ScalingMethod::Normalize => "normalize",
    ScalingMethod::Robust => "robust",
    ScalingMethod::None => "none",
});

wire_names!(EncodingMethod, "encoding", {
    EncodingMethod::OneHot => "onehot",
    EncodingMethod::Label => "label",
    EncodingMethod::Target => "target",
});

/// A single knob change applied through [`PreprocessingConfig::set_option`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessingOption {
    /// Missing value handling.
    HandleMissing(MissingValueStrategy),
    /// Feature scaling.
    Scaling(ScalingMethod),
    /// Categorical encoding.
    Encoding(EncodingMethod),
    /// Training share in percent.
    TrainTestSplit(u8),
}

impl PreprocessingOption {
    /// Parses a `(field, value)` pair using the wire names.
    pub fn parse(field: &str, value: &str) -> Result<Self, WizardError> {
        match field {
            "handleMissing" => value.parse().map(Self::HandleMissing),
            "scaling" => value.parse().map(Self::Scaling),
            "encoding" => value.parse().map(Self::Encoding),
            "trainTestSplit" => value
                .trim()
                .parse::<u8>()
                .map(Self::TrainTestSplit)
                .map_err(|_| WizardError::validation(format!("invalid split ratio: {value}"))),
            other => Err(WizardError::validation(format!(
                "unknown preprocessing option: {other}"
            ))),
        }
    }
}

/// Wire form of the four transformation knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessingOptions {
    /// Missing value strategy.
    pub handle_missing: MissingValueStrategy,
    /// Scaling method.
    pub scaling: ScalingMethod,
    /// Encoding method.
    pub encoding: EncodingMethod,
    /// Training share in percent.
    pub train_test_split: u8,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            handle_missing: MissingValueStrategy::default(),
            scaling: ScalingMethod::default(),
            encoding: EncodingMethod::default(),
            train_test_split: 80,
        }
    }
}

/// Session-scoped preprocessing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessingConfig {
    /// Column to predict.
    pub target_column: Option<String>,
    /// Columns left out of the feature set.
    pub excluded_columns: IndexSet<String>,
    /// Transformation knobs.
    #[serde(flatten)]
    pub options: PreprocessingOptions,
}

impl PreprocessingConfig {
    /// Sets the target column, dropping it from the exclusions.
    pub fn set_target(&mut self, column: impl Into<String>) {
        let column = column.into();
        self.excluded_columns.shift_remove(&column);
        self.target_column = Some(column);
    }

    /// Flips exclusion of `column`. Returns `false` when the call was a no-op
    /// because `column` is the current target.
    pub fn toggle_exclude(&mut self, column: &str) -> bool {
        if self.target_column.as_deref() == Some(column) {
            return false;
        }
        if !self.excluded_columns.shift_remove(column) {
            self.excluded_columns.insert(column.to_string());
        }
        true
    }

    /// Applies one knob change.
    pub fn set_option(&mut self, option: PreprocessingOption) -> Result<(), WizardError> {
        match option {
            PreprocessingOption::HandleMissing(value) => self.options.handle_missing = value,
            PreprocessingOption::Scaling(value) => self.options.scaling = value,
            PreprocessingOption::Encoding(value) => self.options.encoding = value,
            PreprocessingOption::TrainTestSplit(value) => {
                if !(MIN_TRAIN_SPLIT..=MAX_TRAIN_SPLIT).contains(&value) {
                    return Err(WizardError::validation(format!(
                        "train/test split must be between {MIN_TRAIN_SPLIT} and {MAX_TRAIN_SPLIT}, got {value}"
                    )));
                }
                self.options.train_test_split = value;
            }
        }
        Ok(())
    }

    /// True when a target is set and not excluded.
    #[must_use]
    pub fn can_proceed(&self) -> bool {
        self.target_column
            .as_ref()
            .is_some_and(|target| !self.excluded_columns.contains(target))
    }

    /// Headers minus the target and excluded columns, in header order.
    #[must_use]
    pub fn feature_columns<'a>(&self, headers: &'a [String]) -> Vec<&'a str> {
        headers
            .iter()
            .filter(|header| {
                self.target_column.as_ref() != Some(*header)
                    && !self.excluded_columns.contains(header.as_str())
            })
            .map(String::as_str)
            .collect()
    }

    /// Human-readable split, e.g. `80% / 20%`.
    #[must_use]
    pub fn split_label(&self) -> String {
        let train = self.options.train_test_split;
        format!("{train}% / {}%", 100 - train)
    }

    /// Forgets column choices while keeping the knobs.
    pub fn clear_columns(&mut self) {
        self.target_column = None;
        self.excluded_columns.clear();
    }

    /// Wire form of the knobs.
    #[must_use]
    pub const fn options(&self) -> PreprocessingOptions {
        self.options
    }
}
