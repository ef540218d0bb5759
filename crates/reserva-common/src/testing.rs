//! Synthetic hotel reservation data for tests.
//!
//! Enabled with the `testing` feature. The generated table has the columns of
//! the real reservations export, a right-skewed `lead_time`, and a
//! `booking_status` that depends on the other columns so models can learn it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{
    AppConfig, DataIngestionConfig, DataProcessingConfig, ModelTrainingConfig,
    ParamDistribution, ParamValue, RandomSearchConfig,
};
use crate::error::Result;

const MEAL_PLANS: &[&str] = &["Meal Plan 1", "Meal Plan 2", "Meal Plan 3", "Not Selected"];
const ROOM_TYPES: &[&str] = &[
    "Room_Type 1",
    "Room_Type 2",
    "Room_Type 4",
    "Room_Type 6",
];
const SEGMENTS: &[&str] = &["Aviation", "Complementary", "Corporate", "Offline", "Online"];

/// `n` reservations drawn from a fixed seed.
pub fn synthetic_reservations(n: usize, seed: u64) -> Result<DataFrame> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut booking_id = Vec::with_capacity(n);
    let mut adults = Vec::with_capacity(n);
    let mut children = Vec::with_capacity(n);
    let mut weekend_nights = Vec::with_capacity(n);
    let mut week_nights = Vec::with_capacity(n);
    let mut meal_plan = Vec::with_capacity(n);
    let mut parking = Vec::with_capacity(n);
    let mut room_type = Vec::with_capacity(n);
    let mut lead_time = Vec::with_capacity(n);
    let mut arrival_year = Vec::with_capacity(n);
    let mut arrival_month = Vec::with_capacity(n);
    let mut arrival_date = Vec::with_capacity(n);
    let mut segment = Vec::with_capacity(n);
    let mut repeated = Vec::with_capacity(n);
    let mut prev_cancellations = Vec::with_capacity(n);
    let mut prev_kept = Vec::with_capacity(n);
    let mut price = Vec::with_capacity(n);
    let mut requests = Vec::with_capacity(n);
    let mut status = Vec::with_capacity(n);

    for i in 0..n {
        booking_id.push(format!("INN{:05}", i + 1));
        adults.push(rng.gen_range(1i64..=3));
        children.push(if rng.gen_bool(0.1) { rng.gen_range(1i64..=2) } else { 0 });
        weekend_nights.push(rng.gen_range(0i64..=2));
        week_nights.push(rng.gen_range(0i64..=5));
        meal_plan.push(MEAL_PLANS[rng.gen_range(0..MEAL_PLANS.len())]);
        let parks = rng.gen_bool(0.05);
        parking.push(i64::from(parks));
        room_type.push(ROOM_TYPES[rng.gen_range(0..ROOM_TYPES.len())]);

        // exponential with mean 85 days, truncated to whole days
        let lead = (-85.0 * (1.0 - rng.gen_range(0.0..1.0f64)).ln()).floor() as i64;
        lead_time.push(lead);

        arrival_year.push(if rng.gen_bool(0.8) { 2018i64 } else { 2017 });
        arrival_month.push(rng.gen_range(1i64..=12));
        arrival_date.push(rng.gen_range(1i64..=28));

        let seg = SEGMENTS[rng.gen_range(0..SEGMENTS.len())];
        segment.push(seg);
        let is_repeated = rng.gen_bool(0.05);
        repeated.push(i64::from(is_repeated));
        prev_cancellations.push(if is_repeated { rng.gen_range(0i64..=3) } else { 0 });
        prev_kept.push(if is_repeated { rng.gen_range(0i64..=10) } else { 0 });

        let room_price = 60.0 + rng.gen_range(0.0..120.0f64);
        price.push((room_price * 100.0).round() / 100.0);
        let special = rng.gen_range(0i64..=3);
        requests.push(special);

        let online = if seg == "Online" { 0.8 } else { 0.0 };
        let loyal = if is_repeated { 1.5 } else { 0.0 };
        let parked = if parks { 1.0 } else { 0.0 };
        let logit = -1.6 + 0.012 * lead as f64 + online - 0.9 * special as f64 - loyal - parked
            + 0.01 * (room_price - 110.0);
        let p_cancel = 1.0 / (1.0 + (-logit).exp());
        status.push(if rng.gen_bool(p_cancel.clamp(0.0, 1.0)) {
            "Canceled"
        } else {
            "Not_Canceled"
        });
    }

    let df = df![
        "Booking_ID" => booking_id,
        "no_of_adults" => adults,
        "no_of_children" => children,
        "no_of_weekend_nights" => weekend_nights,
        "no_of_week_nights" => week_nights,
        "type_of_meal_plan" => meal_plan,
        "required_car_parking_space" => parking,
        "room_type_reserved" => room_type,
        "lead_time" => lead_time,
        "arrival_year" => arrival_year,
        "arrival_month" => arrival_month,
        "arrival_date" => arrival_date,
        "market_segment_type" => segment,
        "repeated_guest" => repeated,
        "no_of_previous_cancellations" => prev_cancellations,
        "no_of_previous_bookings_not_canceled" => prev_kept,
        "avg_price_per_room" => price,
        "no_of_special_requests" => requests,
        "booking_status" => status,
    ]?;
    Ok(df)
}

/// A configuration matching [`synthetic_reservations`], with a search small
/// enough for tests.
pub fn sample_config() -> AppConfig {
    AppConfig {
        data_ingestion: DataIngestionConfig {
            bucket_name: "reservations".to_string(),
            bucket_file_name: "Hotel_Reservations.csv".to_string(),
            train_size: 0.8,
        },
        data_processing: DataProcessingConfig {
            categorical_features: [
                "type_of_meal_plan",
                "required_car_parking_space",
                "room_type_reserved",
                "market_segment_type",
                "repeated_guest",
                "booking_status",
            ]
            .map(String::from)
            .to_vec(),
            numerical_features: [
                "lead_time",
                "no_of_special_requests",
                "avg_price_per_room",
                "arrival_month",
                "arrival_date",
                "no_of_week_nights",
                "no_of_weekend_nights",
            ]
            .map(String::from)
            .to_vec(),
            skewness_threshold: 1.0,
            no_of_features: 10,
            balance_test_set: true,
            smote_k_neighbors: 5,
            forest_estimators: 20,
            random_state: 42,
        },
        model_training: ModelTrainingConfig {
            random_search: RandomSearchConfig {
                n_iter: 2,
                cv: 2,
                verbose: 1,
                n_jobs: 2,
                random_state: 42,
                scoring: "accuracy".to_string(),
            },
            param_distributions: BTreeMap::from([
                ("n_estimators".to_string(), ParamDistribution::Randint(10, 30)),
                ("max_depth".to_string(), ParamDistribution::Randint(3, 6)),
                (
                    "learning_rate".to_string(),
                    ParamDistribution::Uniform(0.05, 0.15),
                ),
                ("num_leaves".to_string(), ParamDistribution::Randint(8, 16)),
                (
                    "boosting_type".to_string(),
                    ParamDistribution::Choice(vec![ParamValue::Str("gbdt".to_string())]),
                ),
            ]),
            experiment_name: "Default".to_string(),
            tracking_dir: PathBuf::from("mlruns"),
        },
    }
}
