//! Model identity and the colon-delimited spec used to describe one on the
//! command line.

use std::fmt;
use std::str::FromStr;

/// What a loaded model is for. `Unassigned` matches any type filter during
/// least-busy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Inference,
    Stt,
    Tts,
    Embedding,
    Unassigned,
}

impl ModelType {
    /// Whether `self` satisfies a selection filter of `wanted`. `Unassigned`
    /// entries and an absent filter both always match.
    pub fn matches(self, wanted: Option<ModelType>) -> bool {
        match wanted {
            None => true,
            Some(w) => self == ModelType::Unassigned || self == w,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelType::Inference => "inference",
            ModelType::Stt => "stt",
            ModelType::Tts => "tts",
            ModelType::Embedding => "embedding",
            ModelType::Unassigned => "unassigned",
        };
        f.write_str(s)
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inference" => Ok(ModelType::Inference),
            "stt" => Ok(ModelType::Stt),
            "tts" => Ok(ModelType::Tts),
            "embedding" => Ok(ModelType::Embedding),
            other => Err(format!("unknown model type: {other}")),
        }
    }
}

/// Parsed from a colon-delimited CLI argument: `path` | `type:path` |
/// `type:id:path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub explicit_id: Option<u64>,
    pub model_type: ModelType,
    pub path: String,
}

impl FromStr for ModelSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        match parts.as_slice() {
            [path] => Ok(ModelSpec {
                explicit_id: None,
                model_type: ModelType::Unassigned,
                path: path.to_string(),
            }),
            [ty, path] => {
                // Disambiguate "type:path" from a bare path containing a
                // colon (e.g. a Windows drive path) by requiring the first
                // segment to parse as a known type.
                match ty.parse::<ModelType>() {
                    Ok(model_type) => Ok(ModelSpec {
                        explicit_id: None,
                        model_type,
                        path: path.to_string(),
                    }),
                    Err(_) => Ok(ModelSpec {
                        explicit_id: None,
                        model_type: ModelType::Unassigned,
                        path: s.to_string(),
                    }),
                }
            }
            [ty, id, path] => {
                let model_type = ty.parse::<ModelType>()?;
                let id: u64 = id
                    .parse()
                    .map_err(|_| format!("invalid model id: {id}"))?;
                if id == 0 {
                    return Err("model id must be positive".to_string());
                }
                Ok(ModelSpec {
                    explicit_id: Some(id),
                    model_type,
                    path: path.to_string(),
                })
            }
            _ => Err(format!("malformed model spec: {s}")),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.explicit_id {
            Some(id) => write!(f, "{}:{}:{}", self.model_type, id, self.path),
            None if self.model_type == ModelType::Unassigned => f.write_str(&self.path),
            None => write!(f, "{}:{}", self.model_type, self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_path() {
        let spec: ModelSpec = "models/llama.gguf".parse().unwrap();
        assert_eq!(spec.explicit_id, None);
        assert_eq!(spec.model_type, ModelType::Unassigned);
        assert_eq!(spec.path, "models/llama.gguf");
    }

    #[test]
    fn parse_type_path() {
        let spec: ModelSpec = "inference:models/llama.gguf".parse().unwrap();
        assert_eq!(spec.model_type, ModelType::Inference);
        assert_eq!(spec.path, "models/llama.gguf");
    }

    #[test]
    fn parse_type_id_path() {
        let spec: ModelSpec = "embedding:7:models/e5.gguf".parse().unwrap();
        assert_eq!(spec.explicit_id, Some(7));
        assert_eq!(spec.model_type, ModelType::Embedding);
        assert_eq!(spec.path, "models/e5.gguf");
    }

    #[test]
    fn rejects_zero_id() {
        assert!("embedding:0:models/e5.gguf".parse::<ModelSpec>().is_err());
    }

    #[test]
    fn format_round_trips() {
        for s in ["models/llama.gguf", "inference:models/llama.gguf", "embedding:7:models/e5.gguf"] {
            let spec: ModelSpec = s.parse().unwrap();
            let formatted = spec.to_string();
            let reparsed: ModelSpec = formatted.parse().unwrap();
            assert_eq!(spec, reparsed);
        }
    }

    #[test]
    fn model_type_matches() {
        assert!(ModelType::Unassigned.matches(Some(ModelType::Inference)));
        assert!(ModelType::Inference.matches(Some(ModelType::Inference)));
        assert!(!ModelType::Stt.matches(Some(ModelType::Inference)));
        assert!(ModelType::Stt.matches(None));
    }
}
