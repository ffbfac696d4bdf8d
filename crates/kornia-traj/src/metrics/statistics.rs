use serde::Serialize;

/// Summary of a sequence of error magnitudes.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ErrorStatistics {
    /// Root mean square.
    pub rmse: f64,
    /// Mean.
    pub mean: f64,
    /// Median, the mean of the two middle samples for an even count.
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Number of samples.
    pub count: usize,
}

impl ErrorStatistics {
    /// Compute the statistics of `samples`.
    ///
    /// Returns `None` for an empty input.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let mean_sq = samples.iter().map(|x| x * x).sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            0.5 * (sorted[mid - 1] + sorted[mid])
        } else {
            sorted[mid]
        };

        Some(Self {
            rmse: mean_sq.sqrt(),
            mean,
            median,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            count: samples.len(),
        })
    }
}

impl std::fmt::Display for ErrorStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rmse   {:.6}", self.rmse)?;
        writeln!(f, "mean   {:.6}", self.mean)?;
        writeln!(f, "median {:.6}", self.median)?;
        writeln!(f, "std    {:.6}", self.std)?;
        writeln!(f, "min    {:.6}", self.min)?;
        writeln!(f, "max    {:.6}", self.max)?;
        write!(f, "count  {}", self.count)
    }
}
