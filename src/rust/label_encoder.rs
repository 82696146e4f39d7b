//! Bijection between category names and the small integers the models train on.

use std::collections::HashMap;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::artifacts::{read_json, write_json_atomic};
use crate::classifier::ClassifierError;

/// How integer codes are assigned when fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodingOrder {
    /// Lexicographic order of the category names
    #[default]
    Sorted,
    /// Order in which categories first appear in the input
    FirstSeen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Fits an encoder over the given categories. Duplicates collapse to one code.
    ///
    /// # Example
    /// ```
    /// use expense_classifier::{LabelEncoder, EncodingOrder};
    ///
    /// let encoder = LabelEncoder::fit(["Shopping", "Bills", "Shopping"], EncodingOrder::Sorted)?;
    /// assert_eq!(encoder.transform("Bills")?, 0);
    /// assert_eq!(encoder.inverse_transform(1)?, "Shopping");
    /// # Ok::<(), expense_classifier::ClassifierError>(())
    /// ```
    pub fn fit<I, S>(categories: I, order: EncodingOrder) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = Vec::new();
        for category in categories {
            let category = category.as_ref();
            if category.is_empty() {
                return Err(ClassifierError::ValidationError("Category cannot be empty".into()));
            }
            if !classes.iter().any(|c| c == category) {
                classes.push(category.to_string());
            }
        }
        if classes.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Cannot fit a label encoder on an empty set of categories".into(),
            ));
        }
        if order == EncodingOrder::Sorted {
            classes.sort();
        }
        Ok(Self::from_classes(classes))
    }

    fn from_classes(classes: Vec<String>) -> Self {
        let index = classes.iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { classes, index }
    }

    pub fn transform(&self, category: &str) -> Result<usize, ClassifierError> {
        self.index.get(category).copied().ok_or_else(|| {
            ClassifierError::UnseenLabel(format!(
                "category '{}' was not seen when the label encoder was fitted (known: {})",
                category,
                self.classes.join(", ")
            ))
        })
    }

    pub fn transform_all<S: AsRef<str>>(&self, categories: &[S]) -> Result<Vec<usize>, ClassifierError> {
        categories.iter().map(|c| self.transform(c.as_ref())).collect()
    }

    pub fn inverse_transform(&self, code: usize) -> Result<&str, ClassifierError> {
        self.classes.get(code).map(String::as_str).ok_or_else(|| {
            ClassifierError::UnseenLabel(format!(
                "encoded label {} is out of range for {} known categories",
                code,
                self.classes.len()
            ))
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ClassifierError> {
        write_json_atomic(path.as_ref(), self)?;
        info!("Label encoder with {} categories saved to {:?}", self.len(), path.as_ref());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let stored: LabelEncoder = read_json(path.as_ref())?;
        let encoder = Self::fit(&stored.classes, EncodingOrder::FirstSeen)?;
        if encoder.len() != stored.classes.len() {
            return Err(ClassifierError::DataError(format!(
                "label encoder at {:?} contains duplicate categories",
                path.as_ref()
            )));
        }
        Ok(encoder)
    }
}
