/// Remote source and local layout defaults.
/// These mirror the public NYC TLC trip-record distribution.

pub const DEFAULT_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";
pub const DEFAULT_DATASET: &str = "yellow_tripdata";
pub const DEFAULT_START_YEAR: i32 = 2023;
pub const DEFAULT_END_YEAR: i32 = 2024;

pub const DEFAULT_RAW_DIR: &str = "data/yellow_taxi";
pub const DEFAULT_PROCESSED_DIR: &str = "data/yellow_taxi_fixed";
pub const DEFAULT_LOG_DIR: &str = "logs";

// Checkpoint file names, one per metadata store instance
pub const DOWNLOADED_CHECKPOINT: &str = "downloaded_files.json";
pub const PROCESSED_CHECKPOINT: &str = "processed_files.json";

pub const DEFAULT_DATABASE_PATH: &str = "data/yellow_taxi_db.sqlite";
pub const DEFAULT_COLLECTION: &str = "processed_trips";
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 10_000;

pub const DEFAULT_CONFIG_FILE: &str = "taxi_etl.toml";
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

// Source column names
pub const COL_VENDOR_ID: &str = "VendorID";
pub const COL_PICKUP: &str = "tpep_pickup_datetime";
pub const COL_DROPOFF: &str = "tpep_dropoff_datetime";
pub const COL_PASSENGER_COUNT: &str = "passenger_count";
pub const COL_TRIP_DISTANCE: &str = "trip_distance";
pub const COL_RATECODE_ID: &str = "RatecodeID";
pub const COL_STORE_AND_FWD: &str = "store_and_fwd_flag";
pub const COL_PU_LOCATION: &str = "PULocationID";
pub const COL_DO_LOCATION: &str = "DOLocationID";
pub const COL_PAYMENT_TYPE: &str = "payment_type";
pub const COL_FARE_AMOUNT: &str = "fare_amount";
pub const COL_EXTRA: &str = "extra";
pub const COL_MTA_TAX: &str = "mta_tax";
pub const COL_TIP_AMOUNT: &str = "tip_amount";
pub const COL_TOLLS_AMOUNT: &str = "tolls_amount";
pub const COL_IMPROVEMENT_SURCHARGE: &str = "improvement_surcharge";
pub const COL_TOTAL_AMOUNT: &str = "total_amount";
pub const COL_CONGESTION_SURCHARGE: &str = "congestion_surcharge";
pub const COL_AIRPORT_FEE: &str = "Airport_fee";

// Distance segment thresholds in miles (inclusive upper bounds)
pub const SHORT_TRIP_MAX_MILES: f64 = 2.0;
pub const MEDIUM_TRIP_MAX_MILES: f64 = 10.0;
