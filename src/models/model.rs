//! Classifier dispatch.
//!
//! The pipeline treats the three classifiers uniformly through `FittedClassifier`:
//! build from a `ClassifierKind`, fit, then ask for positive-class probabilities.

use nalgebra::DMatrix;

use crate::domain::{ClassifierKind, ClassifyConfig};
use crate::error::AppError;
use crate::models::{DecisionTree, Mlp, RandomForest};

#[derive(Debug, Clone)]
pub enum FittedClassifier {
    Tree(DecisionTree),
    Forest(RandomForest),
    Mlp(Mlp),
}

impl FittedClassifier {
    /// Build and train a classifier of the given kind.
    pub fn train(
        kind: ClassifierKind,
        config: &ClassifyConfig,
        x: &DMatrix<f64>,
        y: &[u8],
        weights: Option<&[f64]>,
    ) -> Result<Self, AppError> {
        match kind {
            ClassifierKind::Tree => {
                let mut tree = DecisionTree::new(config.tree.clone());
                tree.fit(x, y, weights)?;
                Ok(FittedClassifier::Tree(tree))
            }
            ClassifierKind::Forest => {
                let mut forest = RandomForest::new(config.forest.clone());
                forest.fit(x, y, weights)?;
                Ok(FittedClassifier::Forest(forest))
            }
            ClassifierKind::Mlp => {
                let mut net = Mlp::new(config.mlp.clone());
                net.fit(x, y, weights)?;
                Ok(FittedClassifier::Mlp(net))
            }
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        match self {
            FittedClassifier::Tree(_) => ClassifierKind::Tree,
            FittedClassifier::Forest(_) => ClassifierKind::Forest,
            FittedClassifier::Mlp(_) => ClassifierKind::Mlp,
        }
    }

    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        match self {
            FittedClassifier::Tree(m) => m.predict_proba(x),
            FittedClassifier::Forest(m) => m.predict_proba(x),
            FittedClassifier::Mlp(m) => m.predict_proba(x),
        }
    }

    /// Impurity-based importances (tree models only).
    pub fn feature_importances(&self) -> Option<&[f64]> {
        match self {
            FittedClassifier::Tree(m) => Some(m.feature_importances()),
            FittedClassifier::Forest(m) => Some(m.feature_importances()),
            FittedClassifier::Mlp(_) => None,
        }
    }

    /// One-line model description for reports.
    pub fn describe(&self) -> String {
        match self {
            FittedClassifier::Tree(m) => format!("depth={} leaves={}", m.depth(), m.n_leaves()),
            FittedClassifier::Forest(m) => match m.oob_accuracy() {
                Some(oob) => format!("trees={} oob_acc={oob:.3}", m.n_trees()),
                None => format!("trees={}", m.n_trees()),
            },
            FittedClassifier::Mlp(m) => match m.loss_curve().last() {
                Some(loss) => format!("epochs={} loss={loss:.4}", m.loss_curve().len()),
                None => "epochs=0".to_string(),
            },
        }
    }
}

/// Per-sample weights `n / (2 * n_class)` so both classes carry equal total weight.
pub fn balanced_weights(y: &[u8]) -> Vec<f64> {
    let n = y.len() as f64;
    let n_pos = y.iter().filter(|&&v| v == 1).count() as f64;
    let n_neg = n - n_pos;
    let w_pos = if n_pos > 0.0 { n / (2.0 * n_pos) } else { 0.0 };
    let w_neg = if n_neg > 0.0 { n / (2.0 * n_neg) } else { 0.0 };
    y.iter().map(|&v| if v == 1 { w_pos } else { w_neg }).collect()
}
