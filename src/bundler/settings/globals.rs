//! Default external module → global variable table.

use std::collections::BTreeMap;

/// Framework and reactive-stream modules that are never inlined into a bundle.
///
/// Both bundle formats treat these ids as external; the UMD wrapper reads them
/// from the listed global variable names.
const DEFAULT_GLOBALS: &[(&str, &str)] = &[
    // Framework packages
    ("@angular/animations", "ng.animations"),
    ("@angular/core", "ng.core"),
    ("@angular/common", "ng.common"),
    ("@angular/forms", "ng.forms"),
    ("@angular/http", "ng.http"),
    ("@angular/platform-browser", "ng.platformBrowser"),
    ("@angular/platform-browser-dynamic", "ng.platformBrowserDynamic"),
    ("@angular/platform-browser/animations", "ng.platformBrowser.animations"),
    // Reactive-stream library pieces
    ("rxjs/Subject", "Rx"),
    ("rxjs/Observable", "Rx"),
    ("rxjs/add/observable/fromEvent", "Rx.Observable"),
    ("rxjs/add/observable/forkJoin", "Rx.Observable"),
    ("rxjs/add/observable/of", "Rx.Observable"),
    ("rxjs/add/observable/merge", "Rx.Observable"),
    ("rxjs/add/observable/throw", "Rx.Observable"),
    ("rxjs/add/operator/auditTime", "Rx.Observable.prototype"),
    ("rxjs/add/operator/toPromise", "Rx.Observable.prototype"),
    ("rxjs/add/operator/map", "Rx.Observable.prototype"),
    ("rxjs/add/operator/filter", "Rx.Observable.prototype"),
    ("rxjs/add/operator/do", "Rx.Observable.prototype"),
    ("rxjs/add/operator/share", "Rx.Observable.prototype"),
    ("rxjs/add/operator/finally", "Rx.Observable.prototype"),
    ("rxjs/add/operator/catch", "Rx.Observable.prototype"),
    ("rxjs/add/operator/first", "Rx.Observable.prototype"),
    ("rxjs/add/operator/startWith", "Rx.Observable.prototype"),
    ("rxjs/add/operator/switchMap", "Rx.Observable.prototype"),
];

/// Returns the default external→global table.
pub fn default_globals() -> BTreeMap<String, String> {
    DEFAULT_GLOBALS
        .iter()
        .map(|(id, global)| (id.to_string(), global.to_string()))
        .collect()
}
