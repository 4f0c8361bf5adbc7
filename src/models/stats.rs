use serde::{Deserialize, Serialize};

/// Engagement category produced by the inference pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engagement {
    Active,
    Passive,
    Distracted,
}

impl Engagement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engagement::Active => "active",
            Engagement::Passive => "passive",
            Engagement::Distracted => "distracted",
        }
    }
}

impl std::fmt::Display for Engagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Engagement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Engagement::Active),
            "passive" => Ok(Engagement::Passive),
            "distracted" => Ok(Engagement::Distracted),
            other => Err(format!("unknown engagement {:?}", other)),
        }
    }
}

/// Head orientation angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub roll: f32,
}

/// Latest inference snapshot for one student
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<Engagement>,
    /// 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_detected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<HeadPose>,
}

/// Partial stats: absent fields leave the current value untouched on merge
pub type StatsUpdate = StudentStats;

impl StudentStats {
    /// Applies every field present in `update`
    pub fn merge(&mut self, update: &StatsUpdate) {
        if let Some(emotion) = &update.emotion {
            self.emotion = Some(emotion.clone());
        }
        if let Some(raw) = &update.raw_emotion {
            self.raw_emotion = Some(raw.clone());
        }
        if let Some(confidence) = update.confidence {
            self.confidence = Some(confidence);
        }
        if let Some(engagement) = update.engagement {
            self.engagement = Some(engagement);
        }
        if let Some(focus) = update.focus_level {
            self.focus_level = Some(focus.min(100));
        }
        if let Some(face) = update.face_detected {
            self.face_detected = Some(face);
        }
        if let Some(pose) = update.pose {
            self.pose = Some(pose);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StudentStats::default()
    }
}
