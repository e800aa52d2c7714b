//! Catmull-Rom 样条段
//!
//! 每个区间 [tᵢ, tᵢ₊₁] 以四个系数 (a, b, c, d) 表示：
//! `y(x) = x²(a·x + b·x') + x'²(c·x + d·x')`，其中 `x = (t − tᵢ)/(tᵢ₊₁ − tᵢ)`，`x' = 1 − x`。
//! 于是 `y(0) = d`、`y(1) = a`，切线由左右邻点的差分给出（张力 0.5）。

/// 单个样条段
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub t0: f32,
    pub t1: f32,
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl Segment {
    pub fn evaluate(&self, t: f32) -> f32 {
        let span = self.t1 - self.t0;
        let x = if span.abs() < f32::EPSILON {
            0.0
        } else {
            (t - self.t0) / span
        };
        let x1 = 1.0 - x;
        x * x * (self.a * x + self.b * x1) + x1 * x1 * (self.c * x + self.d * x1)
    }
}

/// Catmull-Rom 曲线
#[derive(Clone, Debug, Default)]
pub struct CatmullRom {
    segments: Vec<Segment>,
    first: Option<(f32, f32)>,
    last: Option<(f32, f32)>,
}

impl CatmullRom {
    /// 由控制点 (t, y) 构建；控制点按 t 排序，重复的 t 保留后者
    pub fn new(points: &[(f32, f32)]) -> Self {
        let mut pts: Vec<(f32, f32)> = points.to_vec();
        pts.sort_by(|a, b| a.0.total_cmp(&b.0));
        pts.dedup_by(|later, earlier| {
            if (later.0 - earlier.0).abs() < 1e-6 {
                earlier.1 = later.1;
                true
            } else {
                false
            }
        });

        let first = pts.first().copied();
        let last = pts.last().copied();
        if pts.len() < 2 {
            return Self {
                segments: Vec::new(),
                first,
                last,
            };
        }

        // 端点处外推出虚拟邻点
        let n = pts.len();
        let mut ext = Vec::with_capacity(n + 2);
        let (t0, y0) = pts[0];
        let (t1, y1) = pts[1];
        ext.push((2.0 * t0 - t1, 2.0 * y0 - y1));
        ext.extend_from_slice(&pts);
        let (tn, yn) = pts[n - 1];
        let (tm, ym) = pts[n - 2];
        ext.push((2.0 * tn - tm, 2.0 * yn - ym));

        let slope = |i: usize| -> f32 {
            let (ta, ya) = ext[i - 1];
            let (tb, yb) = ext[i + 1];
            if (tb - ta).abs() < f32::EPSILON {
                0.0
            } else {
                (yb - ya) / (tb - ta)
            }
        };

        let segments = (1..=n - 1)
            .map(|i| {
                let (ta, ya) = ext[i];
                let (tb, yb) = ext[i + 1];
                let span = tb - ta;
                let ma = slope(i) * span;
                let mb = slope(i + 1) * span;
                Segment {
                    t0: ta,
                    t1: tb,
                    a: yb,
                    b: 3.0 * yb - mb,
                    c: 3.0 * ya + ma,
                    d: ya,
                }
            })
            .collect();

        Self {
            segments,
            first,
            last,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 求值；区间外返回端点值
    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some((tf, yf)), Some((tl, yl))) = (self.first, self.last) else {
            return 0.0;
        };
        if t <= tf {
            return yf;
        }
        if t >= tl {
            return yl;
        }
        for segment in &self.segments {
            if t >= segment.t0 && t <= segment.t1 {
                return segment.evaluate(t);
            }
        }
        yl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_control_points() {
        let pts = [(0.0, 1.0), (2.0, 3.0), (5.0, -1.0), (6.0, 0.5)];
        let cr = CatmullRom::new(&pts);
        assert_eq!(cr.segments().len(), 3);
        for (t, y) in pts {
            assert!((cr.evaluate(t) - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_linear_data_stays_linear() {
        let pts: Vec<(f32, f32)> = (0..5).map(|i| (i as f32 * 2.0, i as f32 * 3.0)).collect();
        let cr = CatmullRom::new(&pts);
        for k in 0..=80 {
            let t = k as f32 * 0.1;
            assert!((cr.evaluate(t) - 1.5 * t).abs() < 1e-4, "t={}", t);
        }
    }

    #[test]
    fn test_clamps_outside_and_single_point() {
        let cr = CatmullRom::new(&[(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(cr.evaluate(-5.0), 2.0);
        assert_eq!(cr.evaluate(9.0), 4.0);

        let single = CatmullRom::new(&[(4.0, 7.0)]);
        assert_eq!(single.evaluate(0.0), 7.0);
        assert_eq!(CatmullRom::new(&[]).evaluate(1.0), 0.0);
    }
}
