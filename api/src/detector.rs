use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::{
    certificate::{validate_certificate, CertificateOptions, CertificateStatus},
    error::Error,
    features::{extract_features, FeatureVector},
    model::{Classifier, Prediction},
    Result,
};

#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub certificate: CertificateOptions,
    /// One deadline per request, shared by the certificate probe and the classifier call.
    pub request_timeout: Duration,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            certificate: CertificateOptions::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Output contract towards the front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub url: String,
    pub is_phishing: bool,
    pub ssl_valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub url: String,
    pub features: FeatureVector,
    pub certificate: CertificateStatus,
    pub prediction: Prediction,
}

impl From<Analysis> for ClassificationResult {
    fn from(analysis: Analysis) -> Self {
        Self {
            url: analysis.url,
            is_phishing: analysis.prediction.is_phishing,
            ssl_valid: analysis.certificate.is_trusted(),
        }
    }
}

pub struct PhishingDetector<C> {
    classifier: C,
    options: DetectorOptions,
}

impl<C: Classifier> PhishingDetector<C> {
    pub fn new(classifier: C, options: DetectorOptions) -> Self {
        Self { classifier, options }
    }

    pub async fn classify(&self, url: &str) -> Result<ClassificationResult> {
        self.analyze(url).await.map(ClassificationResult::from)
    }

    /// Features and certificate are computed concurrently and stay separate:
    /// certificate status never enters the feature vector. The classifier does not
    /// wait for the certificate, so both run against the same deadline.
    pub async fn analyze(&self, url: &str) -> Result<Analysis> {
        let deadline = Instant::now() + self.options.request_timeout;
        let features = extract_features(url);

        let (certificate, prediction) = tokio::join!(
            self.check_certificate(url, deadline),
            timeout_at(deadline, self.classifier.predict(&features)),
        );
        let prediction = prediction.map_err(|_| Error::classifier("prediction timed out"))??;

        info!(url, is_phishing = prediction.is_phishing, certificate = ?certificate, "url classified");
        Ok(Analysis {
            url: url.to_owned(),
            features,
            certificate,
            prediction,
        })
    }

    async fn check_certificate(&self, url: &str, deadline: Instant) -> CertificateStatus {
        timeout_at(deadline, validate_certificate(url, &self.options.certificate))
            .await
            .unwrap_or_else(|_| {
                warn!(url, "certificate check exceeded request timeout");
                CertificateStatus::TimedOut
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Inner connect/handshake limits far above the request timeout.
    fn slow_probe_options(port: u16, request_timeout: Duration) -> DetectorOptions {
        DetectorOptions {
            certificate: CertificateOptions {
                connect_timeout: Duration::from_secs(30),
                handshake_timeout: Duration::from_secs(30),
                port,
            },
            request_timeout,
        }
    }

    /// Phishing iff the keyword slot is at least `min_keywords`.
    struct KeywordClassifier {
        min_keywords: f64,
        calls: AtomicUsize,
    }

    impl KeywordClassifier {
        fn new(min_keywords: f64) -> Self {
            Self { min_keywords, calls: AtomicUsize::new(0) }
        }
    }

    impl Classifier for KeywordClassifier {
        async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let hits = features.get_by_name("suspicious_word_count").unwrap_or(0.0);
            Ok(Prediction { is_phishing: hits >= self.min_keywords, confidence: None })
        }
    }

    struct Unavailable;

    impl Classifier for Unavailable {
        async fn predict(&self, _: &FeatureVector) -> Result<Prediction> {
            Err(Error::classifier("model not loaded"))
        }
    }

    struct Stalled;

    impl Classifier for Stalled {
        async fn predict(&self, _: &FeatureVector) -> Result<Prediction> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Prediction { is_phishing: false, confidence: None })
        }
    }

    #[tokio::test]
    async fn plain_http_url_with_keywords() {
        let detector = PhishingDetector::new(KeywordClassifier::new(2.0), DetectorOptions::default());
        let url = "http://192.0.2.1/verify-account-update";

        let analysis = detector.analyze(url).await.unwrap();
        assert_eq!(analysis.features.get_by_name("has_https"), Some(0.0));
        assert_eq!(analysis.features.get_by_name("suspicious_word_count"), Some(3.0));
        assert_eq!(analysis.certificate, CertificateStatus::PlainTransport);

        let result = detector.classify(url).await.unwrap();
        assert_eq!(
            result,
            ClassificationResult { url: url.to_owned(), is_phishing: true, ssl_valid: false }
        );
    }

    #[tokio::test]
    async fn classify_is_repeatable() {
        let detector = PhishingDetector::new(KeywordClassifier::new(1.0), DetectorOptions::default());
        let first = detector.classify("http://secure-login.biz").await.unwrap();
        let second = detector.classify("http://secure-login.biz").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(detector.classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_url_still_gets_a_verdict() {
        let detector = PhishingDetector::new(KeywordClassifier::new(1.0), DetectorOptions::default());
        let result = detector.classify("").await.unwrap();
        assert!(!result.is_phishing);
        assert!(!result.ssl_valid);
    }

    #[tokio::test]
    async fn classifier_failure_is_surfaced() {
        let detector = PhishingDetector::new(Unavailable, DetectorOptions::default());
        let err = detector.classify("http://example.com").await.unwrap_err();
        assert!(matches!(err, Error::ClassifierUnavailable(_)));
    }

    #[tokio::test]
    async fn stalled_classifier_times_out() {
        let options = DetectorOptions {
            request_timeout: Duration::from_millis(100),
            ..DetectorOptions::default()
        };
        let detector = PhishingDetector::new(Stalled, options);
        let err = detector.classify("http://example.com").await.unwrap_err();
        assert!(matches!(err, Error::ClassifierUnavailable(_)));
    }

    #[tokio::test]
    async fn certificate_check_is_capped_by_request_timeout() {
        // Accepted by the kernel backlog, never answers the ClientHello.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let detector = PhishingDetector::new(
            KeywordClassifier::new(1.0),
            slow_probe_options(port, Duration::from_millis(200)),
        );

        let analysis = detector.analyze("https://127.0.0.1/login").await.unwrap();
        assert_eq!(analysis.certificate, CertificateStatus::TimedOut);
        assert!(analysis.prediction.is_phishing);
        assert!(!ClassificationResult::from(analysis).ssl_valid);
        drop(listener);
    }

    #[tokio::test]
    async fn one_deadline_covers_certificate_and_classifier() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let request_timeout = Duration::from_millis(300);
        let detector = PhishingDetector::new(Stalled, slow_probe_options(port, request_timeout));

        let started = std::time::Instant::now();
        let err = detector.classify("https://127.0.0.1/").await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::ClassifierUnavailable(_)));
        assert!(elapsed < request_timeout + Duration::from_millis(250), "took {elapsed:?}");
        drop(listener);
    }
}
