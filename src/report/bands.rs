use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Band {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Concentration,
    Comprehension,
    ReadingSpeed,
    Fluency,
    Clarity,
}

impl Metric {
    /// Lower bounds of the Medium and High bands. Bands are half-open, so a
    /// value equal to a bound belongs to the higher band.
    pub fn thresholds(self) -> (f64, f64) {
        match self {
            Metric::Concentration => (40.0, 70.0),
            Metric::Comprehension => (60.0, 80.0),
            Metric::ReadingSpeed => (20.0, 50.0),
            Metric::Fluency => (60.0, 80.0),
            Metric::Clarity => (60.0, 80.0),
        }
    }

    pub fn classify(self, value: f64) -> Band {
        let (medium, high) = self.thresholds();
        if value >= high {
            Band::High
        } else if value >= medium {
            Band::Medium
        } else {
            Band::Low
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Metric::Concentration => "Concentration",
            Metric::Comprehension => "Comprehension",
            Metric::ReadingSpeed => "Reading speed",
            Metric::Fluency => "Fluency",
            Metric::Clarity => "Pronunciation clarity",
        }
    }

    pub fn label(self, band: Band) -> &'static str {
        match (self, band) {
            (Metric::Concentration, Band::High) => "High",
            (Metric::Concentration, Band::Medium) => "Moderate",
            (Metric::Concentration, Band::Low) => "Needs attention",
            (Metric::ReadingSpeed, Band::High) => "Fast",
            (Metric::ReadingSpeed, Band::Medium) => "Steady",
            (Metric::ReadingSpeed, Band::Low) => "Slow",
            (Metric::Clarity, Band::High) => "Clear",
            (Metric::Clarity, Band::Medium) => "Fine",
            (Metric::Comprehension | Metric::Fluency, Band::High) => "Very good",
            (Metric::Comprehension, Band::Medium) => "Fair",
            (Metric::Fluency, Band::Medium) => "Good",
            (_, Band::Low) => "Needs practice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBand {
    pub metric: Metric,
    pub value: f64,
    pub band: Band,
    pub label: &'static str,
}

impl MetricBand {
    pub fn new(metric: Metric, value: f64) -> Self {
        let band = metric.classify(value);
        Self {
            metric,
            value,
            band,
            label: metric.label(band),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_belong_to_the_higher_band() {
        assert_eq!(Metric::Concentration.classify(39.9), Band::Low);
        assert_eq!(Metric::Concentration.classify(40.0), Band::Medium);
        assert_eq!(Metric::Concentration.classify(70.0), Band::High);
        assert_eq!(Metric::Comprehension.classify(59.99), Band::Low);
        assert_eq!(Metric::Comprehension.classify(80.0), Band::High);
        assert_eq!(Metric::ReadingSpeed.classify(20.0), Band::Medium);
        assert_eq!(Metric::ReadingSpeed.classify(49.9), Band::Medium);
        assert_eq!(Metric::ReadingSpeed.classify(50.0), Band::High);
        assert_eq!(Metric::Fluency.classify(60.0), Band::Medium);
        assert_eq!(Metric::Clarity.classify(0.0), Band::Low);
    }

    #[test]
    fn labels_follow_the_band() {
        assert_eq!(MetricBand::new(Metric::ReadingSpeed, 10.0).label, "Slow");
        assert_eq!(MetricBand::new(Metric::Clarity, 85.0).label, "Clear");
        assert_eq!(MetricBand::new(Metric::Fluency, 65.0).label, "Good");
        assert_eq!(MetricBand::new(Metric::Concentration, 0.0).label, "Needs attention");
    }
}
