use std::fmt;

/// Output classes in the order the network's logits are laid out.
pub const CLASS_LABELS: [Label; 2] = [Label::Normal, Label::Pneumonia];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Normal,
    Pneumonia,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "NORMAL",
            Label::Pneumonia => "PNEUMONIA",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        CLASS_LABELS.get(index).copied()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// Probability of `label`, in `0.0..=1.0`.
    pub confidence: f32,
}

impl Prediction {
    pub fn from_logits(logits: &[f32]) -> Result<Self, String> {
        if logits.len() != CLASS_LABELS.len() {
            return Err(format!(
                "expected {} logits, got {}",
                CLASS_LABELS.len(),
                logits.len()
            ));
        }
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(format!("non-finite logits: {:?}", logits));
        }

        let probabilities = softmax(logits);
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .reduce(|best, item| if item.1 > best.1 { item } else { best })
            .ok_or_else(|| "empty probability vector".to_string())?;

        let label = Label::from_index(index)
            .ok_or_else(|| format!("no label bound to class index {}", index))?;

        Ok(Self { label, confidence })
    }

    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.
    }

    /// Confidence rendered as `NN.NN%`.
    pub fn format_confidence(&self) -> String {
        format!("{:.2}%", self.confidence_percent())
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}
