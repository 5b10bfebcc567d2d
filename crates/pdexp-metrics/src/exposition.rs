//! Point-in-time snapshot of the registry and its Prometheus text form.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

/// Name, help and label schema of a registered metric vector.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    /// Label names in declaration order, which is also the rendering order.
    pub variable_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// Current value of a counter or gauge series.
    Scalar(f64),
    /// Per-bucket (not cumulative) counts; the last bound is `+Inf`.
    Histogram {
        buckets: Vec<(f64, u64)>,
        count: u64,
        sum: f64,
    },
}

/// One series of a metric vector.
#[derive(Debug, Clone)]
pub struct MetricSample {
    /// `(name, value)` pairs in the descriptor's label order.
    pub labels: Vec<(String, String)>,
    pub value: SampleValue,
}

impl MetricSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CollectedMetric {
    pub descriptor: MetricDescriptor,
    pub samples: Vec<MetricSample>,
}

impl CollectedMetric {
    /// Appends the HELP/TYPE header and every sample line to `output`.
    pub fn write_text(&self, output: &mut String) {
        let name = &self.descriptor.name;
        let help = escape_help(&self.descriptor.help);
        output.push_str(&format!("# HELP {name} {help}\n"));
        output.push_str(&format!(
            "# TYPE {name} {}\n",
            self.descriptor.metric_type.as_prometheus_type()
        ));

        for sample in &self.samples {
            match &sample.value {
                SampleValue::Scalar(value) => {
                    write_line(output, name, &sample.labels, None, *value);
                }
                SampleValue::Histogram {
                    buckets,
                    count,
                    sum,
                } => {
                    let bucket_name = format!("{name}_bucket");
                    let mut cumulative = 0_u64;
                    for (bound, bucket_count) in buckets {
                        cumulative = cumulative.saturating_add(*bucket_count);
                        let le = ("le", format_bucket_bound(*bound));
                        let value = cumulative as f64;
                        write_line(output, &bucket_name, &sample.labels, Some(le), value);
                    }
                    write_line(output, &format!("{name}_sum"), &sample.labels, None, *sum);
                    let count = *count as f64;
                    write_line(output, &format!("{name}_count"), &sample.labels, None, count);
                }
            }
        }
    }
}

fn write_line(
    output: &mut String,
    name: &str,
    labels: &[(String, String)],
    extra: Option<(&str, String)>,
    value: f64,
) {
    output.push_str(name);

    let pairs = labels
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .chain(extra.as_ref().map(|(key, value)| (*key, value.as_str())));
    let rendered = pairs
        .map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
        .collect::<Vec<_>>();
    if !rendered.is_empty() {
        output.push('{');
        output.push_str(&rendered.join(","));
        output.push('}');
    }

    output.push(' ');
    output.push_str(&format_metric_value(value));
    output.push('\n');
}

/// Integral values print without a fraction, so epoch timestamps stay exact.
fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_bucket_bound(value: f64) -> String {
    if value.is_infinite() {
        "+Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
