use crate::models::{JobType, JobTypeDescriptor, JobTypeStatus, ParameterSpec};

const ANALYZE_STOCK_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec {
        name: "symbol",
        description: "Stock symbol (e.g., AAPL)",
        required: true,
    },
    ParameterSpec {
        name: "analysis_depth",
        description: "Optional: quick or deep (default: deep)",
        required: false,
    },
];
const COMPARE_STOCKS_PARAMETERS: &[ParameterSpec] = &[ParameterSpec {
    name: "symbols",
    description: "List of stock symbols",
    required: true,
}];
const MARKET_SCAN_PARAMETERS: &[ParameterSpec] = &[ParameterSpec {
    name: "sector",
    description: "Optional sector filter",
    required: false,
}];

const ALL_JOB_TYPES: [JobTypeDescriptor; 3] = [
    JobTypeDescriptor {
        job_type: JobType::AnalyzeStock,
        description: "Comprehensive stock analysis",
        parameters: ANALYZE_STOCK_PARAMETERS,
        status: JobTypeStatus::Active,
    },
    JobTypeDescriptor {
        job_type: JobType::CompareStocks,
        description: "Compare multiple stocks",
        parameters: COMPARE_STOCKS_PARAMETERS,
        status: JobTypeStatus::ComingSoon,
    },
    JobTypeDescriptor {
        job_type: JobType::MarketScan,
        description: "Scan market for opportunities",
        parameters: MARKET_SCAN_PARAMETERS,
        status: JobTypeStatus::ComingSoon,
    },
];

pub fn job_types() -> &'static [JobTypeDescriptor] {
    &ALL_JOB_TYPES
}

pub fn descriptor(job_type: JobType) -> &'static JobTypeDescriptor {
    match job_type {
        JobType::AnalyzeStock => &ALL_JOB_TYPES[0],
        JobType::CompareStocks => &ALL_JOB_TYPES[1],
        JobType::MarketScan => &ALL_JOB_TYPES[2],
    }
}

#[cfg(test)]
mod tests {
    use super::{descriptor, job_types};
    use crate::models::{JobType, JobTypeStatus};

    #[test]
    fn every_job_type_has_one_descriptor() {
        for job_type in JobType::ALL {
            assert_eq!(descriptor(job_type).job_type, job_type);
        }
        assert_eq!(job_types().len(), JobType::ALL.len());
    }

    #[test]
    fn only_analyze_stock_is_active() {
        let active: Vec<_> = job_types()
            .iter()
            .filter(|descriptor| descriptor.status == JobTypeStatus::Active)
            .map(|descriptor| descriptor.job_type)
            .collect();

        assert_eq!(active, vec![JobType::AnalyzeStock]);
    }

    #[test]
    fn descriptors_serialize_with_type_key() {
        let value = serde_json::to_value(descriptor(JobType::MarketScan)).unwrap();
        assert_eq!(value["type"], "market_scan");
        assert_eq!(value["status"], "coming_soon");
        assert_eq!(value["parameters"][0]["name"], "sector");
    }
}
