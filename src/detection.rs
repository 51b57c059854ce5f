use serde_derive::{Deserialize, Serialize};

/// Object classes a detector may report for a microscopy frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Sperm,
    RoundCell,
    Debris,
}

impl ClassLabel {
    /// Maps a raw model class index onto a label.
    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(ClassLabel::Sperm),
            1 => Some(ClassLabel::RoundCell),
            2 => Some(ClassLabel::Debris),
            _ => None,
        }
    }
}

/// Contains (x,y) of the center and (width,height) of bbox, in pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c", default = "default_class")]
    pub class: ClassLabel,
}

fn default_class() -> ClassLabel {
    ClassLabel::Sperm
}

impl Detection {
    pub fn new(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            confidence,
            class: ClassLabel::Sperm,
        }
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let b1_area = self.w * self.h;
        let b2_area = other.w * other.h;

        let i_xmin = self.xmin().max(other.xmin());
        let i_xmax = self.xmax().min(other.xmax());
        let i_ymin = self.ymin().max(other.ymin());
        let i_ymax = self.ymax().min(other.ymax());
        let i_area = (i_xmax - i_xmin).max(0.) * (i_ymax - i_ymin).max(0.);

        let union = b1_area + b2_area - i_area;
        if union <= 0. {
            return 0.;
        }

        i_area / union
    }

    /// Same box moved so that its center is at (x, y).
    #[inline]
    pub fn centered_at(&self, x: f32, y: f32) -> Detection {
        Detection { x, y, ..*self }
    }

    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    #[inline(always)]
    pub fn xmax(&self) -> f32 {
        self.x + self.w / 2.
    }

    #[inline(always)]
    pub fn ymax(&self) -> f32 {
        self.y + self.h / 2.
    }

    #[inline(always)]
    pub fn xmin(&self) -> f32 {
        self.x - self.w / 2.
    }

    #[inline(always)]
    pub fn ymin(&self) -> f32 {
        self.y - self.h / 2.
    }
}
