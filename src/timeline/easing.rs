use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Easing curve applied to keyframe progress, selected by table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Easing {
    #[default]
    Linear = 0,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InQuart,
    OutQuart,
    InOutQuart,
    InQuint,
    OutQuint,
    InOutQuint,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
    InBack,
    OutBack,
    InOutBack,
    InElastic,
    OutElastic,
    InOutElastic,
    InBounce,
    OutBounce,
    InOutBounce,
}

type EasingFn = fn(f32) -> f32;

const TABLE: [(Easing, EasingFn); 31] = [
    (Easing::Linear, linear),
    (Easing::InQuad, in_quad),
    (Easing::OutQuad, out_quad),
    (Easing::InOutQuad, in_out_quad),
    (Easing::InCubic, in_cubic),
    (Easing::OutCubic, out_cubic),
    (Easing::InOutCubic, in_out_cubic),
    (Easing::InQuart, in_quart),
    (Easing::OutQuart, out_quart),
    (Easing::InOutQuart, in_out_quart),
    (Easing::InQuint, in_quint),
    (Easing::OutQuint, out_quint),
    (Easing::InOutQuint, in_out_quint),
    (Easing::InSine, in_sine),
    (Easing::OutSine, out_sine),
    (Easing::InOutSine, in_out_sine),
    (Easing::InExpo, in_expo),
    (Easing::OutExpo, out_expo),
    (Easing::InOutExpo, in_out_expo),
    (Easing::InCirc, in_circ),
    (Easing::OutCirc, out_circ),
    (Easing::InOutCirc, in_out_circ),
    (Easing::InBack, in_back),
    (Easing::OutBack, out_back),
    (Easing::InOutBack, in_out_back),
    (Easing::InElastic, in_elastic),
    (Easing::OutElastic, out_elastic),
    (Easing::InOutElastic, in_out_elastic),
    (Easing::InBounce, in_bounce),
    (Easing::OutBounce, out_bounce),
    (Easing::InOutBounce, in_out_bounce),
];

impl Easing {
    pub const COUNT: usize = TABLE.len();

    pub fn from_index(index: u8) -> Option<Easing> {
        TABLE.get(index as usize).map(|(easing, _)| *easing)
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        (TABLE[self as usize].1)(t)
    }
}

impl TryFrom<u8> for Easing {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Easing::from_index(index).ok_or_else(|| format!("unknown easing function #{}", index))
    }
}

impl From<Easing> for u8 {
    fn from(easing: Easing) -> u8 {
        easing.index()
    }
}

fn linear(t: f32) -> f32 {
    t
}

fn in_quad(t: f32) -> f32 {
    t * t
}

fn out_quad(t: f32) -> f32 {
    1.0 - (1.0 - t) * (1.0 - t)
}

fn in_out_quad(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

fn in_cubic(t: f32) -> f32 {
    t * t * t
}

fn out_cubic(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(3)
}

fn in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn in_quart(t: f32) -> f32 {
    t.powi(4)
}

fn out_quart(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(4)
}

fn in_out_quart(t: f32) -> f32 {
    if t < 0.5 {
        8.0 * t.powi(4)
    } else {
        1.0 - (-2.0 * t + 2.0).powi(4) / 2.0
    }
}

fn in_quint(t: f32) -> f32 {
    t.powi(5)
}

fn out_quint(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(5)
}

fn in_out_quint(t: f32) -> f32 {
    if t < 0.5 {
        16.0 * t.powi(5)
    } else {
        1.0 - (-2.0 * t + 2.0).powi(5) / 2.0
    }
}

fn in_sine(t: f32) -> f32 {
    1.0 - (t * PI / 2.0).cos()
}

fn out_sine(t: f32) -> f32 {
    (t * PI / 2.0).sin()
}

fn in_out_sine(t: f32) -> f32 {
    -((PI * t).cos() - 1.0) / 2.0
}

fn in_expo(t: f32) -> f32 {
    if t == 0.0 {
        0.0
    } else {
        2f32.powf(10.0 * t - 10.0)
    }
}

fn out_expo(t: f32) -> f32 {
    if t == 1.0 {
        1.0
    } else {
        1.0 - 2f32.powf(-10.0 * t)
    }
}

fn in_out_expo(t: f32) -> f32 {
    if t == 0.0 {
        0.0
    } else if t == 1.0 {
        1.0
    } else if t < 0.5 {
        2f32.powf(20.0 * t - 10.0) / 2.0
    } else {
        (2.0 - 2f32.powf(-20.0 * t + 10.0)) / 2.0
    }
}

fn in_circ(t: f32) -> f32 {
    1.0 - (1.0 - t * t).max(0.0).sqrt()
}

fn out_circ(t: f32) -> f32 {
    (1.0 - (t - 1.0).powi(2)).max(0.0).sqrt()
}

fn in_out_circ(t: f32) -> f32 {
    if t < 0.5 {
        (1.0 - (1.0 - (2.0 * t).powi(2)).max(0.0).sqrt()) / 2.0
    } else {
        ((1.0 - (-2.0 * t + 2.0).powi(2)).max(0.0).sqrt() + 1.0) / 2.0
    }
}

const BACK_C1: f32 = 1.70158;
const BACK_C2: f32 = BACK_C1 * 1.525;
const BACK_C3: f32 = BACK_C1 + 1.0;

fn in_back(t: f32) -> f32 {
    BACK_C3 * t * t * t - BACK_C1 * t * t
}

fn out_back(t: f32) -> f32 {
    1.0 + BACK_C3 * (t - 1.0).powi(3) + BACK_C1 * (t - 1.0).powi(2)
}

fn in_out_back(t: f32) -> f32 {
    if t < 0.5 {
        ((2.0 * t).powi(2) * ((BACK_C2 + 1.0) * 2.0 * t - BACK_C2)) / 2.0
    } else {
        ((2.0 * t - 2.0).powi(2) * ((BACK_C2 + 1.0) * (t * 2.0 - 2.0) + BACK_C2) + 2.0) / 2.0
    }
}

const ELASTIC_C4: f32 = (2.0 * PI) / 3.0;
const ELASTIC_C5: f32 = (2.0 * PI) / 4.5;

fn in_elastic(t: f32) -> f32 {
    if t == 0.0 || t == 1.0 {
        t
    } else {
        -(2f32.powf(10.0 * t - 10.0)) * ((t * 10.0 - 10.75) * ELASTIC_C4).sin()
    }
}

fn out_elastic(t: f32) -> f32 {
    if t == 0.0 || t == 1.0 {
        t
    } else {
        2f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * ELASTIC_C4).sin() + 1.0
    }
}

fn in_out_elastic(t: f32) -> f32 {
    if t == 0.0 || t == 1.0 {
        t
    } else if t < 0.5 {
        -(2f32.powf(20.0 * t - 10.0) * ((20.0 * t - 11.125) * ELASTIC_C5).sin()) / 2.0
    } else {
        (2f32.powf(-20.0 * t + 10.0) * ((20.0 * t - 11.125) * ELASTIC_C5).sin()) / 2.0 + 1.0
    }
}

fn out_bounce(t: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;
    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}

fn in_bounce(t: f32) -> f32 {
    1.0 - out_bounce(1.0 - t)
}

fn in_out_bounce(t: f32) -> f32 {
    if t < 0.5 {
        (1.0 - out_bounce(1.0 - 2.0 * t)) / 2.0
    } else {
        (1.0 + out_bounce(2.0 * t - 1.0)) / 2.0
    }
}
