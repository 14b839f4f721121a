//! Request classification by target host.

use url::Url;

/// Weather API host.
pub const WEATHER_HOST: &str = "api.open-meteo.com";

/// Web-font stylesheet and font file hosts.
pub const FONT_HOSTS: [&str; 2] = ["fonts.googleapis.com", "fonts.gstatic.com"];

/// External image hosts.
pub const IMAGE_HOSTS: [&str; 2] = ["images.unsplash.com", "upload.wikimedia.org"];

/// Category an intercepted request falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  WeatherData,
  WebFonts,
  ExternalImages,
  Default,
}

/// How a route is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Network only, with a JSON stand-in when offline
  NetworkOnly,
  /// Store first, network on a miss
  CacheFirst,
  /// Network first, store on failure
  NetworkFirst,
}

impl Route {
  pub fn strategy(self) -> Strategy {
    match self {
      Route::WeatherData => Strategy::NetworkOnly,
      Route::WebFonts | Route::ExternalImages => Strategy::CacheFirst,
      Route::Default => Strategy::NetworkFirst,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Route::WeatherData => "weather-data",
      Route::WebFonts => "web-fonts",
      Route::ExternalImages => "external-images",
      Route::Default => "default",
    }
  }
}

/// Classify a URL by its host. Anything unrecognized is `Default`.
pub fn classify(url: &Url) -> Route {
  match url.host_str() {
    Some(host) if host == WEATHER_HOST => Route::WeatherData,
    Some(host) if FONT_HOSTS.contains(&host) => Route::WebFonts,
    Some(host) if IMAGE_HOSTS.contains(&host) => Route::ExternalImages,
    _ => Route::Default,
  }
}
